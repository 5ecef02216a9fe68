//! u-boot env image editor (`u-boot/uenv.c`): a CRC32-protected, NUL-separated
//! `key=value` text blob whose size isn't stored anywhere in the file itself
//! — `detect` recovers it by trial.

use std::path::Path;

use anyhow::{anyhow, bail, Context as _};

use crate::context::Context;
use crate::editor::{flags, Editor, EditorState};
use crate::primitives::crc::crc32;
use crate::util::aligned_length;
use crate::vfs::VfHandle;

pub const UENV_MINIMUM_SIZE: u64 = 2048;
const UENV_MAXIMUM_SIZE: u64 = 2 * 1024 * 1024;
const BETTER_SIZE: u64 = 128 * 1024;
const CRC_SIZE: u64 = 4;

const ENV_PART_MAIN: u8 = 0;
const ENV_PART_REDUND: u8 = 1;

#[derive(Default)]
struct UenvState {
    env_size: u64,
}

/// Ports `uenv_auto_detect_filesize`: the file carries no size field, so the
/// only way to recover it is to try decreasing candidate sizes (aligned
/// down from the real file length, then in 128 KiB steps, then by halving)
/// until the trailing CRC32 checks out.
fn auto_detect_filesize(ctx: &mut Context, handle: VfHandle) -> anyhow::Result<u64>
{
    let file_len = ctx.vfs.filelength(handle)?;
    let mut sz = if file_len >= UENV_MAXIMUM_SIZE { UENV_MAXIMUM_SIZE } else { aligned_length(file_len, BETTER_SIZE) };

    ctx.vfs.fileseek(handle, 0)?;
    let mut crc_buf = [0u8; CRC_SIZE as usize];
    ctx.vfs.fileread(handle, &mut crc_buf)?;
    let crc_expected = u32::from_le_bytes(crc_buf);

    while sz > UENV_MINIMUM_SIZE {
        if sz <= file_len {
            ctx.vfs.fileseek(handle, CRC_SIZE)?;
            let mut body = vec![0u8; (sz - CRC_SIZE) as usize];
            if ctx.vfs.fileread(handle, &mut body)? == body.len() && crc32(&body) == crc_expected {
                return Ok(sz);
            }
        }

        sz = if sz > BETTER_SIZE { sz - BETTER_SIZE } else { sz / 2 };
    }

    Err(anyhow!("no candidate size produced a matching crc32"))
}

pub struct UenvEditor;

impl Editor for UenvEditor {
    fn name(&self) -> &'static str
    {
        "uenv"
    }

    fn descriptor(&self) -> &'static str
    {
        "u-boot env image editor"
    }

    fn flags(&self) -> u32
    {
        flags::HIDE_INFO_WHEN_LIST
    }

    fn header_size(&self) -> usize
    {
        UENV_MINIMUM_SIZE as usize
    }

    fn init(&self, _ctx: &mut Context) -> EditorState
    {
        Box::new(UenvState::default())
    }

    /// Never auto-detected: any arbitrary text blob can end with a byte
    /// sequence whose trailing 4 bytes happen to checksum, so the original
    /// restricts this format to `--type uenv` only.
    fn detect(&self, state: &mut EditorState, ctx: &mut Context, handle: VfHandle, force_type: bool) -> anyhow::Result<()>
    {
        if !force_type {
            bail!("uenv is only detected via --type");
        }

        let env_size = auto_detect_filesize(ctx, handle)?;
        state.downcast_mut::<UenvState>().expect("uenv state").env_size = env_size;
        Ok(())
    }

    fn list(&self, state: &mut EditorState, ctx: &mut Context, handle: VfHandle, _args: &[String]) -> anyhow::Result<()>
    {
        let env_size = state.downcast_ref::<UenvState>().expect("uenv state").env_size;

        ctx.vfs.fileseek(handle, 0)?;
        let mut buf = vec![0u8; env_size as usize];
        ctx.vfs.fileread(handle, &mut buf)?;

        let mut i = CRC_SIZE as usize;
        print!("#uEnv {env_size} ");
        if i < buf.len() && (buf[i] == ENV_PART_MAIN || buf[i] == ENV_PART_REDUND) {
            print!("{}", buf[i]);
            i += 1;
        }
        println!();

        while i < buf.len().saturating_sub(1) {
            match buf[i] {
                b'\r' => print!("\\r"),
                b'\n' => print!("\\n\n"),
                0 => {
                    println!();
                    if buf.get(i + 1) == Some(&0) {
                        break;
                    }
                }
                c => print!("{}", c as char),
            }
            i += 1;
        }

        Ok(())
    }

    /// `uenv_pack` reads a plain-text sidecar produced by (and shaped like)
    /// `list`'s own output — not a JSON config, unlike the other editors.
    fn pack(&self, state: &mut EditorState, _ctx: &mut Context, input: &Path, out: &mut std::fs::File, _args: &[String]) -> anyhow::Result<()>
    {
        use std::io::{BufRead, Seek, SeekFrom, Write};

        let f = std::fs::File::open(input).with_context(|| format!("opening {}", input.display()))?;
        let mut lines = std::io::BufReader::new(f).lines();

        let title = lines.next().ok_or_else(|| anyhow!("empty uenv source"))??;
        let mut title_fields = title.trim_start_matches("#uEnv").split_whitespace();
        let env_size: u64 = title_fields.next().ok_or_else(|| anyhow!("bad uEnv title `{title}`"))?.parse().with_context(|| format!("bad uEnv title `{title}`"))?;
        let env_part: Option<u8> = match title_fields.next() {
            Some(s) => Some(s.parse().with_context(|| format!("bad env part in `{title}`"))?),
            None => None,
        };

        if env_size % 2 != 0 {
            bail!("env size ({env_size}) is not power2");
        }
        if let Some(part) = env_part {
            if part != ENV_PART_MAIN && part != ENV_PART_REDUND {
                bail!("bad part {part}");
            }
        }

        out.set_len(env_size)?;
        out.seek(SeekFrom::Start(CRC_SIZE))?;
        if let Some(part) = env_part {
            out.write_all(&[part])?;
        }

        for line in lines {
            let line = line?;
            let line = line.replace("\\r", "\r").replace("\\n", "\n");
            out.write_all(line.as_bytes())?;
            out.write_all(&[0])?;
        }

        if out.stream_position()? > env_size {
            bail!("env size overflow");
        }

        out.seek(SeekFrom::Start(CRC_SIZE))?;
        let mut body = vec![0u8; (env_size - CRC_SIZE) as usize];
        std::io::Read::read_exact(out, &mut body)?;
        let crc = crc32(&body);

        out.seek(SeekFrom::Start(0))?;
        out.write_all(&crc.to_le_bytes())?;

        state.downcast_mut::<UenvState>().expect("uenv state").env_size = env_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn build_env(body_lines: &[&str], size: u64) -> Vec<u8>
    {
        let mut buf = vec![0u8; size as usize];
        let mut pos = CRC_SIZE as usize;
        for line in body_lines {
            let bytes = line.as_bytes();
            buf[pos..pos + bytes.len()].copy_from_slice(bytes);
            pos += bytes.len() + 1; // NUL terminator, buf already zeroed
        }
        let crc = crc32(&buf[CRC_SIZE as usize..]);
        buf[0..4].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    #[test]
    fn detect_recovers_size()
    {
        let buf = build_env(&["foo=bar", "baz=qux"], UENV_MINIMUM_SIZE);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.bin");
        std::fs::File::create(&path).unwrap().write_all(&buf).unwrap();

        let mut ctx = Context::new(0);
        let handle = ctx.vfs.open(&path, 0).unwrap();
        assert_eq!(auto_detect_filesize(&mut ctx, handle).unwrap(), UENV_MINIMUM_SIZE);
    }

    #[test]
    fn pack_then_detect_round_trips()
    {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("env.txt");
        std::fs::write(&src, format!("#uEnv {UENV_MINIMUM_SIZE}\nfoo=bar\nbaz=qux\n")).unwrap();

        let out_path = dir.path().join("env.bin");
        let mut out = std::fs::File::create(&out_path).unwrap();

        let editor = UenvEditor;
        let mut ctx = Context::new(0);
        let mut state = editor.init(&mut ctx);
        editor.pack(&mut state, &mut ctx, &src, &mut out, &[]).unwrap();
        drop(out);

        let handle = ctx.vfs.open(&out_path, 0).unwrap();
        assert_eq!(auto_detect_filesize(&mut ctx, handle).unwrap(), UENV_MINIMUM_SIZE);
    }
}

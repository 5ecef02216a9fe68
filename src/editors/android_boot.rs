//! Android boot.img editor (`android/android_bootimg.c`): header versions
//! 0-2, SHA-1 `id` field computed over size-prefixed page-aligned component
//! slices, multi-bin unpack/pack (spec sec. 5, S2).

use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context as _};
use bincode::{DefaultOptions, Options};
use serde::{Deserialize, Serialize};

use crate::array::Array;
use crate::context::Context;
use crate::editor::{flags, Editor, EditorState, SearchMagic};
use crate::error::ImgError;
use crate::primitives::hash::{hex, Sha1Hasher};
use crate::util::aligned_length;
use crate::vfs::VfHandle;

const ANDR_BOOT_MAGIC: &[u8; 8] = b"ANDROID!";
const ANDR_BOOT_NAME_SIZE: usize = 16;
const ANDR_BOOT_ARGS_SIZE: usize = 512;
const ANDR_BOOT_EXTRA_ARGS_SIZE: usize = 1024;

fn bincode_opts() -> impl Options
{
    DefaultOptions::new().with_fixint_encoding().allow_trailing_bytes()
}

#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct AndrImgHdr {
    pub magic: [u8; 8],
    pub kernel_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    pub second_size: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    pub header_version: u32,
    pub os_version: u32,
    pub name: [u8; ANDR_BOOT_NAME_SIZE],
    pub cmdline: Array<u8, ANDR_BOOT_ARGS_SIZE>,
    pub extra_cmdline: Array<u8, ANDR_BOOT_EXTRA_ARGS_SIZE>,
    pub id: [u8; 32],
    pub recovery_dtbo_size: u32,
    pub recovery_dtbo_offset: u64,
    pub header_size: u32,
    pub dtb_size: u32,
    pub dtb_addr: u64,
}

impl Default for AndrImgHdr {
    fn default() -> Self
    {
        Self {
            magic: [0; 8],
            kernel_size: 0,
            kernel_addr: 0,
            ramdisk_size: 0,
            ramdisk_addr: 0,
            second_size: 0,
            second_addr: 0,
            tags_addr: 0,
            page_size: 0,
            header_version: 0,
            os_version: 0,
            name: [0; ANDR_BOOT_NAME_SIZE],
            cmdline: Array::default(),
            extra_cmdline: Array::default(),
            id: [0; 32],
            recovery_dtbo_size: 0,
            recovery_dtbo_offset: 0,
            header_size: 0,
            dtb_size: 0,
            dtb_addr: 0,
        }
    }
}

impl AndrImgHdr {
    fn file_size(&self, idx: usize) -> u32
    {
        match idx {
            0 => self.kernel_size,
            1 => self.ramdisk_size,
            2 => self.second_size,
            3 => self.recovery_dtbo_size,
            4 => self.dtb_size,
            _ => unreachable!(),
        }
    }

    fn set_file_size(&mut self, idx: usize, sz: u32)
    {
        match idx {
            0 => self.kernel_size = sz,
            1 => self.ramdisk_size = sz,
            2 => self.second_size = sz,
            3 => self.recovery_dtbo_size = sz,
            4 => self.dtb_size = sz,
            _ => unreachable!(),
        }
    }

    fn cstr(bytes: &[u8]) -> String
    {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }
}

fn header_from_bytes(buf: &[u8]) -> anyhow::Result<AndrImgHdr>
{
    Ok(bincode_opts().deserialize(buf)?)
}

fn header_to_bytes(hdr: &AndrImgHdr) -> anyhow::Result<Vec<u8>>
{
    Ok(bincode_opts().serialize(hdr)?)
}

/// `abootimg_files`: order matters, each slot gated behind the header
/// version that introduced it.
struct FileSlot {
    min_version: u32,
    name: &'static str,
}

const FILE_SLOTS: [FileSlot; 5] = [
    FileSlot { min_version: 0, name: "kernel.bin" },
    FileSlot { min_version: 0, name: "ramdisk.bin" },
    FileSlot { min_version: 0, name: "second.bin" },
    FileSlot { min_version: 1, name: "recovery_dtbo.bin" },
    FileSlot { min_version: 2, name: "dtb.bin" },
];

#[derive(Default)]
struct AbootimgState {
    hdr: AndrImgHdr,
    total_size: u64,
}

pub struct AndroidBootEditor;

impl Editor for AndroidBootEditor {
    fn name(&self) -> &'static str
    {
        "abootimg"
    }

    fn descriptor(&self) -> &'static str
    {
        "android boot.img editor"
    }

    fn flags(&self) -> u32
    {
        flags::CONTAIN_MULTI_BIN
    }

    fn header_size(&self) -> usize
    {
        bincode_opts().serialized_size(&AndrImgHdr::default()).unwrap_or(1660) as usize
    }

    fn search_magic(&self) -> Option<SearchMagic>
    {
        Some(SearchMagic { pattern: ANDR_BOOT_MAGIC, offset_in_header: 0 })
    }

    fn init(&self, _ctx: &mut Context) -> EditorState
    {
        Box::new(AbootimgState::default())
    }

    fn detect(&self, state: &mut EditorState, ctx: &mut Context, handle: VfHandle, force_type: bool) -> anyhow::Result<()>
    {
        let hdr_size = self.header_size();
        ctx.vfs.fileseek(handle, 0)?;
        let mut buf = vec![0u8; hdr_size];
        let n = ctx.vfs.fileread(handle, &mut buf)?;
        if n != buf.len() {
            return Err(ImgError::Truncated { needed: buf.len() as u64, have: n as u64 }.into());
        }
        let hdr = header_from_bytes(&buf)?;

        if hdr.magic != *ANDR_BOOT_MAGIC {
            ctx.diagnose(force_type, "magic doesn't match");
            return Err(ImgError::BadMagic {
                expected: String::from_utf8_lossy(ANDR_BOOT_MAGIC).into_owned(),
                actual: hex(&hdr.magic),
            }
            .into());
        }
        if hdr.header_version > 2 {
            ctx.diagnose(force_type, &format!("bad header_version {}", hdr.header_version));
            bail!("unsupported header_version {}", hdr.header_version);
        }
        match hdr.page_size {
            2048 | 4096 | 8192 | 16384 => {}
            other => {
                ctx.diagnose(force_type, &format!("bad page_size {other}"));
                bail!("bad page_size {other}");
            }
        }

        let n_files = 3 + hdr.header_version as usize;
        let mut hasher = Sha1Hasher::new();
        let mut offset = hdr.page_size as u64;

        for i in 0..n_files {
            let sz = hdr.file_size(i);
            if sz > 0 {
                ctx.vfs.fileseek(handle, offset)?;
                let mut data = vec![0u8; sz as usize];
                let n = ctx.vfs.fileread(handle, &mut data)?;
                if n != data.len() {
                    return Err(ImgError::Truncated { needed: data.len() as u64, have: n as u64 }.into());
                }
                hasher.update(&data);
            }
            hasher.update(&sz.to_le_bytes());
            offset += aligned_length(sz as u64, hdr.page_size as u64);
        }

        let digest = hasher.finish();
        if hdr.id[..digest.len()] != digest {
            ctx.diagnose(force_type, "sha1sum doesn't match");
            return Err(ImgError::ChecksumMismatch { expected: hex(&hdr.id[..digest.len()]), computed: hex(&digest) }.into());
        }

        let st = state.downcast_mut::<AbootimgState>().expect("abootimg state");
        st.hdr = hdr;
        st.total_size = offset;
        Ok(())
    }

    fn total_size(&self, state: &EditorState, _ctx: &Context) -> Option<u64>
    {
        Some(state.downcast_ref::<AbootimgState>().expect("abootimg state").total_size)
    }

    fn list(&self, state: &mut EditorState, _ctx: &mut Context, _handle: VfHandle, _args: &[String]) -> anyhow::Result<()>
    {
        let hdr = &state.downcast_ref::<AbootimgState>().expect("abootimg state").hdr;

        println!("kernel:           {:#010x} {:#010x}", hdr.kernel_addr, hdr.kernel_size);
        println!("ramdisk:          {:#010x} {:#010x}", hdr.ramdisk_addr, hdr.ramdisk_size);
        println!("second:           {:#010x} {:#010x}", hdr.second_addr, hdr.second_size);
        println!("tags:             {:#010x}", hdr.tags_addr);
        println!("pagesize:         {}", hdr.page_size);
        println!("header_version:   {}", hdr.header_version);
        println!("os_version:       {:#010x}", hdr.os_version);
        println!("name:             {}", AndrImgHdr::cstr(&hdr.name));
        println!("cmdline:          {}", AndrImgHdr::cstr(&hdr.cmdline.0));
        println!("extra_cmdline:    {}", AndrImgHdr::cstr(&hdr.extra_cmdline.0));
        println!("id:               {}", hex(&hdr.id));

        if hdr.header_version > 0 {
            println!("recovery_dtbo:    {:#010x} {:#010x}", hdr.recovery_dtbo_offset, hdr.recovery_dtbo_size);
            println!("header_size:      {}", hdr.header_size);
        }
        if hdr.header_version > 1 {
            println!("dtb:              {:#010x} {:#010x}", hdr.dtb_addr, hdr.dtb_size);
        }

        Ok(())
    }

    fn unpack(&self, state: &mut EditorState, ctx: &mut Context, handle: VfHandle, out: &Path, _args: &[String]) -> anyhow::Result<()>
    {
        let hdr = state.downcast_ref::<AbootimgState>().expect("abootimg state").hdr;

        std::fs::create_dir_all(out)?;
        let mut offset = hdr.page_size as u64;
        let mut files = Vec::new();

        for (i, slot) in FILE_SLOTS.iter().enumerate() {
            if slot.min_version > hdr.header_version {
                break;
            }
            let sz = hdr.file_size(i);
            if sz == 0 {
                continue;
            }

            ctx.vfs.fileseek(handle, offset)?;
            let mut data = vec![0u8; sz as usize];
            ctx.vfs.fileread(handle, &mut data)?;
            std::fs::write(out.join(slot.name), &data)?;

            files.push(slot.name.to_string());
            offset += aligned_length(sz as u64, hdr.page_size as u64);
        }

        let json = AbootimgJson::from_header(&hdr, files);
        std::fs::write(out.join("abootimg.json"), serde_json::to_string_pretty(&json)?)?;

        Ok(())
    }

    fn pack(&self, state: &mut EditorState, _ctx: &mut Context, input: &Path, out: &mut File, _args: &[String]) -> anyhow::Result<()>
    {
        use std::io::{Seek, SeekFrom, Write};

        let text = std::fs::read_to_string(input.join("abootimg.json")).with_context(|| "reading abootimg.json")?;
        let json: AbootimgJson = serde_json::from_str(&text)?;

        let mut hdr = json.to_header()?;

        match hdr.page_size {
            2048 | 4096 | 8192 | 16384 => {}
            other => bail!("invalid page size {other}"),
        }

        match hdr.header_version {
            0 => {
                hdr.recovery_dtbo_size = 0;
                hdr.recovery_dtbo_offset = 0;
                hdr.header_size = 0;
                hdr.dtb_size = 0;
                hdr.dtb_addr = 0;
            }
            1 => {
                hdr.dtb_size = 0;
                hdr.dtb_addr = 0;
            }
            2 => {}
            other => bail!("invalid header version {other}"),
        }

        if json.files.iter().any(|f| f == "recovery_dtbo.bin") && hdr.header_version < 1 {
            bail!("recovery dtbo needs header_version 1 or later");
        }
        if json.files.iter().any(|f| f == "dtb.bin") && hdr.header_version < 2 {
            bail!("dtb needs header_version 2 or later");
        }

        let mut hasher = Sha1Hasher::new();
        let mut offset = hdr.page_size as u64;
        let mut padsz = 0u64;

        for (i, slot) in FILE_SLOTS.iter().enumerate() {
            if slot.min_version > hdr.header_version {
                break;
            }

            if !json.files.iter().any(|f| f == slot.name) {
                hdr.set_file_size(i, 0);
                hasher.update(&0u32.to_le_bytes());
                continue;
            }

            let data = std::fs::read(input.join(slot.name)).with_context(|| format!("reading {}", slot.name))?;
            let len = data.len() as u32;
            hdr.set_file_size(i, len);

            out.seek(SeekFrom::Start(offset))?;
            out.write_all(&data)?;
            hasher.update(&data);
            hasher.update(&len.to_le_bytes());

            let end = offset + data.len() as u64;
            offset += aligned_length(data.len() as u64, hdr.page_size as u64);
            padsz = offset - end;
        }

        if padsz != 0 {
            out.seek(SeekFrom::Start(offset - 1))?;
            out.write_all(&[0u8])?;
        }

        let digest = hasher.finish();
        hdr.id = [0; 32];
        hdr.id[..digest.len()].copy_from_slice(&digest);
        hdr.magic = *ANDR_BOOT_MAGIC;

        out.seek(SeekFrom::Start(0))?;
        out.write_all(&header_to_bytes(&hdr)?)?;

        let st = state.downcast_mut::<AbootimgState>().expect("abootimg state");
        st.hdr = hdr;
        st.total_size = offset;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct AbootimgJson {
    kernel_addr: u32,
    ramdisk_addr: u32,
    second_addr: u32,
    tags_addr: u32,
    page_size: u32,
    header_version: u32,
    os_version: u32,
    name: String,
    cmdline: String,
    extra_cmdline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recovery_dtbo_addr: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dtb_addr: Option<u64>,
    files: Vec<String>,
}

impl AbootimgJson {
    fn from_header(hdr: &AndrImgHdr, files: Vec<String>) -> Self
    {
        Self {
            kernel_addr: hdr.kernel_addr,
            ramdisk_addr: hdr.ramdisk_addr,
            second_addr: hdr.second_addr,
            tags_addr: hdr.tags_addr,
            page_size: hdr.page_size,
            header_version: hdr.header_version,
            os_version: hdr.os_version,
            name: AndrImgHdr::cstr(&hdr.name),
            cmdline: AndrImgHdr::cstr(&hdr.cmdline.0),
            extra_cmdline: AndrImgHdr::cstr(&hdr.extra_cmdline.0),
            recovery_dtbo_addr: (hdr.header_version > 0).then_some(hdr.recovery_dtbo_offset),
            dtb_addr: (hdr.header_version > 1).then_some(hdr.dtb_addr),
            files,
        }
    }

    fn to_header(&self) -> anyhow::Result<AndrImgHdr>
    {
        fn pack_cstr<const N: usize>(s: &str) -> anyhow::Result<Array<u8, N>>
        {
            if s.len() >= N {
                bail!("string `{s}` too long for a {N}-byte field");
            }
            let mut arr = [0u8; N];
            arr[..s.len()].copy_from_slice(s.as_bytes());
            Ok(Array(arr))
        }

        let mut name = [0u8; ANDR_BOOT_NAME_SIZE];
        if self.name.len() >= ANDR_BOOT_NAME_SIZE {
            bail!("name too long");
        }
        name[..self.name.len()].copy_from_slice(self.name.as_bytes());

        Ok(AndrImgHdr {
            magic: *ANDR_BOOT_MAGIC,
            kernel_addr: self.kernel_addr,
            ramdisk_addr: self.ramdisk_addr,
            second_addr: self.second_addr,
            tags_addr: self.tags_addr,
            page_size: self.page_size,
            header_version: self.header_version,
            os_version: self.os_version,
            name,
            cmdline: pack_cstr(&self.cmdline)?,
            extra_cmdline: pack_cstr(&self.extra_cmdline)?,
            recovery_dtbo_offset: self.recovery_dtbo_addr.unwrap_or(0),
            dtb_addr: self.dtb_addr.unwrap_or(0),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_detect_round_trips()
    {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kernel.bin"), b"kernel-bytes").unwrap();
        std::fs::write(dir.path().join("ramdisk.bin"), b"ramdisk-bytes").unwrap();
        std::fs::write(
            dir.path().join("abootimg.json"),
            serde_json::json!({
                "kernel_addr": 0x1080_0000u32,
                "ramdisk_addr": 0x1100_0000u32,
                "second_addr": 0u32,
                "tags_addr": 0x1000_0100u32,
                "page_size": 2048u32,
                "header_version": 0u32,
                "os_version": 0u32,
                "name": "",
                "cmdline": "",
                "extra_cmdline": "",
                "files": ["kernel.bin", "ramdisk.bin"],
            })
            .to_string(),
        )
        .unwrap();

        let out_path = dir.path().join("boot.img");
        let mut out = File::create(&out_path).unwrap();

        let editor = AndroidBootEditor;
        let mut ctx = Context::new(0);
        let mut state = editor.init(&mut ctx);
        editor.pack(&mut state, &mut ctx, dir.path(), &mut out, &[]).unwrap();
        drop(out);

        let handle = ctx.vfs.open(&out_path, 0).unwrap();
        let mut state2 = editor.init(&mut ctx);
        editor.detect(&mut state2, &mut ctx, handle, true).unwrap();

        let st = state2.downcast_ref::<AbootimgState>().unwrap();
        assert_eq!(st.hdr.kernel_size as usize, b"kernel-bytes".len());
    }
}

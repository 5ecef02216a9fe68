//! L5: the dispatch algorithm (spec sec. 4.1) — resolve an editor for the
//! input (forced by `--type` or by iterating the registry's `detect`),
//! run the requested operation, then release every acquired resource.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context as _};

use crate::context::Context;
use crate::vfs::VfHandle;

use super::registry::Registry;
use super::{Editor, EditorState};

/// Name of the sidecar file `unpack` drops in a multi-bin output directory
/// so a later `pack` can recover which editor produced it without the
/// caller having to pass `--type` again.
pub const TYPE_SIDECAR: &str = ".imgeditor";

pub enum Action {
    List,
    /// `out = None` defers to the dispatch table's own default (spec sec.
    /// 4.1): multi-bin editors unpack into `<input>.dump`, single-bin
    /// editors require an explicit destination.
    Unpack { out: Option<PathBuf> },
    Pack { out: PathBuf },
    Peek { out: PathBuf },
    /// Editor-specific subcommand, e.g. `gpt -- partitions <out> <spec>`.
    Main,
}

pub struct Request<'a> {
    pub input: &'a Path,
    pub base_offset: u64,
    pub forced_type: Option<&'a str>,
    pub action: Action,
    pub sub_args: &'a [String],
}

/// Iterates the registry in registration order, seeking the handle back to
/// `filestart` before every attempt, stopping at the first editor whose
/// `detect` succeeds (spec sec. 4.1 step 4). Editors smaller than
/// `header_size` are skipped without being asked to detect.
fn auto_detect(
    ctx: &mut Context,
    registry: &Registry,
    handle: VfHandle,
) -> anyhow::Result<(Arc<dyn Editor>, EditorState)>
{
    let total_len = ctx.vfs.filelength(handle)?;

    for editor in registry.iter() {
        if editor.header_size() as u64 > total_len {
            continue;
        }

        let mut state = editor.init(ctx);
        ctx.vfs.fileseek(handle, 0)?;

        match editor.detect(&mut state, ctx, handle, false) {
            Ok(()) => return Ok((editor.clone(), state)),
            Err(e) => {
                ctx.diagnose(false, &format!("{} did not match: {:#}", editor.name(), e));
                editor.exit(state, ctx);
            }
        }
    }

    Err(anyhow!("no registered editor recognised this input"))
}

/// Looks the editor up by name and forces `detect` (the scanner's
/// `force_type = true` path): a failure here is a real error, not "try the
/// next editor".
fn forced_detect(
    ctx: &mut Context,
    registry: &Registry,
    handle: VfHandle,
    name: &str,
) -> anyhow::Result<(Arc<dyn Editor>, EditorState)>
{
    let editor = registry
        .by_name(name)
        .ok_or_else(|| anyhow!("unknown editor type `{}`", name))?
        .clone();

    let mut state = editor.init(ctx);
    ctx.vfs.fileseek(handle, 0)?;

    match editor.detect(&mut state, ctx, handle, true) {
        Ok(()) => Ok((editor, state)),
        Err(e) => {
            editor.exit(state, ctx);
            Err(e).with_context(|| format!("editor `{}` rejected this input", name))
        }
    }
}

fn resolve(
    ctx: &mut Context,
    registry: &Registry,
    handle: VfHandle,
    forced_type: Option<&str>,
) -> anyhow::Result<(Arc<dyn Editor>, EditorState)>
{
    match forced_type {
        Some(name) => forced_detect(ctx, registry, handle, name),
        None => auto_detect(ctx, registry, handle),
    }
}

/// Copies the exact byte range the resolved editor claims as its
/// container (`total_size`) to `out`. Requires the editor to report a
/// known extent; most multi-bin containers embedded in a larger image do.
fn run_peek(
    ctx: &mut Context,
    handle: VfHandle,
    editor: &Arc<dyn Editor>,
    state: &EditorState,
    out: &Path,
) -> anyhow::Result<()>
{
    let size = editor
        .total_size(state, ctx)
        .ok_or_else(|| anyhow!("editor `{}` does not report a known size", editor.name()))?;

    ctx.vfs.fileseek(handle, 0)?;
    let mut remaining = size;
    let mut dst = File::create(out)?;
    let mut buf = vec![0u8; 1 << 16];

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = ctx.vfs.fileread(handle, &mut buf[..want])?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n])?;
        remaining -= n as u64;
    }

    Ok(())
}

/// `<input>.dump`: the output directory a multi-bin `unpack` falls back to
/// when the caller gave no explicit destination (spec sec. 4.1's dispatch
/// table).
fn default_dump_path(input: &Path) -> PathBuf
{
    let mut name = input.as_os_str().to_os_string();
    name.push(".dump");
    PathBuf::from(name)
}

/// Reads back the editor name an earlier `unpack` recorded next to a
/// multi-bin output directory.
fn read_type_sidecar(dir: &Path) -> anyhow::Result<String>
{
    let path = dir.join(TYPE_SIDECAR);
    std::fs::read_to_string(&path)
        .map(|s| s.trim().to_string())
        .with_context(|| format!("reading {}", path.display()))
}

fn write_type_sidecar(dir: &Path, name: &str) -> anyhow::Result<()>
{
    std::fs::write(dir.join(TYPE_SIDECAR), name)?;
    Ok(())
}

/// Runs one dispatch cycle: resolves the editor (when the action needs
/// one opened through the virtual-file layer), performs the requested
/// operation, then unconditionally releases the editor's state and clears
/// the partition registry (spec sec. 4.1 steps 5-7).
pub fn run(ctx: &mut Context, registry: &Registry, req: &Request) -> anyhow::Result<()>
{
    let result = match &req.action {
        Action::Pack { out } => run_pack(ctx, registry, req, out),
        Action::Main => run_main(ctx, registry, req),
        _ => run_file_backed(ctx, registry, req),
    };

    ctx.partitions.clear();
    result
}

/// `main` mode never opens the input through the virtual-file layer (the
/// original source's `ACTION_MAIN` branch looks the editor up and invokes
/// it directly) — some `main` subcommands, like `gpt -- partitions`, build
/// an image from scratch rather than reading one.
fn run_main(ctx: &mut Context, registry: &Registry, req: &Request) -> anyhow::Result<()>
{
    let name = req.forced_type.ok_or_else(|| anyhow!("`main` mode requires --type"))?;
    let editor = registry
        .by_name(name)
        .ok_or_else(|| anyhow!("unknown editor type `{}`", name))?
        .clone();

    let mut state = editor.init(ctx);
    let result = editor.main(&mut state, ctx, req.sub_args);
    editor.exit(state, ctx);

    result
}

fn run_file_backed(ctx: &mut Context, registry: &Registry, req: &Request) -> anyhow::Result<()>
{
    let handle = ctx.vfs.open(req.input, req.base_offset)?;
    let (editor, mut state) = resolve(ctx, registry, handle, req.forced_type)?;

    let result = match &req.action {
        Action::List => editor.list(&mut state, ctx, handle, req.sub_args),
        Action::Unpack { out } => {
            let multi_bin = editor.flags() & super::flags::CONTAIN_MULTI_BIN != 0;
            let resolved = match out {
                Some(p) => p.clone(),
                None if multi_bin => default_dump_path(req.input),
                None => {
                    editor.exit(state, ctx);
                    ctx.vfs.close(handle);
                    return Err(anyhow!("editor `{}` is single-bin and requires an explicit output path", editor.name()));
                }
            };

            let r = editor.unpack(&mut state, ctx, handle, &resolved, req.sub_args);
            if r.is_ok() && multi_bin {
                write_type_sidecar(&resolved, editor.name())?;
            }
            r
        }
        Action::Peek { out } => run_peek(ctx, handle, &editor, &state, out),
        Action::Main => unreachable!("handled by run_main"),
        Action::Pack { .. } => unreachable!("handled by run_pack"),
    };

    editor.exit(state, ctx);
    ctx.vfs.close(handle);
    result
}

fn run_pack(ctx: &mut Context, registry: &Registry, req: &Request, out: &Path) -> anyhow::Result<()>
{
    let name = match req.forced_type {
        Some(n) => n.to_string(),
        None => read_type_sidecar(req.input)
            .with_context(|| "no --type given and no .imgeditor sidecar found; pass --type explicitly")?,
    };

    let editor = registry
        .by_name(&name)
        .ok_or_else(|| anyhow!("unknown editor type `{}`", name))?
        .clone();

    let mut state = editor.init(ctx);
    let mut dst = File::create(out)?;
    let result = editor.pack(&mut state, ctx, req.input, &mut dst, req.sub_args);
    editor.exit(state, ctx);

    result
}

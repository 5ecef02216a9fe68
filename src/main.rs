//! CLI entry point (spec sec. 6.1), grounded on `main.c`'s `getopt_long`
//! argument grammar: `--peek`/`--unpack`/`--pack` each carry the *input*
//! path as their own option value, so the single positional argument is
//! dual-role — it's the input for plain list/search, but the output
//! destination whenever one of those three options is given. `--unpack`'s
//! positional is optional: the dispatcher defaults it to `<input>.dump`
//! for multi-bin editors (spec sec. 4.1's dispatch table); `--peek`/
//! `--pack` still require it explicitly. Anything after a literal `--` is
//! passed through untouched as an editor subcommand (`gpt -- partitions
//! …`, `ext2 -- inode …`), which promotes the invocation straight to
//! `Action::Main`.

use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;

use imgeditor::context::Context;
use imgeditor::editor::dispatch::{self, Action, Request};
use imgeditor::editor::plugin::PluginLoader;
use imgeditor::editor::search;
use imgeditor::editors::build_registry;

#[derive(Debug, Parser)]
#[command(name = "imgeditor", version, about = "Multi-format firmware image inspector/rebuilder")]
struct Cli {
    /// Input path for plain list/search; output destination when
    /// `--peek`/`--unpack`/`--pack` is given.
    positional: Option<PathBuf>,

    /// Byte offset into input.
    #[arg(long, default_value_t = 0)]
    offset: u64,

    /// Sector offset into input (combines with `--sector-size`).
    #[arg(long, default_value_t = 0)]
    sector: u64,

    /// Sector size in bytes.
    #[arg(long = "sector-size", default_value_t = 512)]
    sector_size: u64,

    /// Extract the exact container extent of IMAGE.
    #[arg(long, value_name = "IMAGE")]
    peek: Option<PathBuf>,

    /// Decompose IMAGE into the positional output directory (defaults to
    /// `<IMAGE>.dump` for multi-bin editors if the positional is omitted).
    #[arg(long, value_name = "IMAGE")]
    unpack: Option<PathBuf>,

    /// Rebuild an image from FIRMWARE_DIR into the positional output path.
    #[arg(long, value_name = "FIRMWARE_DIR")]
    pack: Option<PathBuf>,

    /// Force a specific editor instead of auto-detecting.
    #[arg(long = "type")]
    r#type: Option<String>,

    /// Scan for embedded containers instead of decoding one.
    #[arg(short = 's', long)]
    search: bool,

    /// Increase verbosity (repeatable).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Plugin root directory.
    #[arg(long)]
    plugin: Option<PathBuf>,

    /// Enumerate loaded plugins and exit.
    #[arg(long = "list-plugin")]
    list_plugin: bool,

    /// Skip plugin loading entirely.
    #[arg(long = "disable-plugin")]
    disable_plugin: bool,

    /// Everything after `--`: an editor's own subcommand and its
    /// arguments.
    #[arg(last = true)]
    sub_args: Vec<String>,
}

fn init_tracing(verbose: u8)
{
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()>
{
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut ctx = Context::new(cli.verbose as u32);
    let mut registry = build_registry();

    if !cli.disable_plugin {
        if let Some(root) = &cli.plugin {
            let mut loader = PluginLoader::new();
            loader.load_dir(root, &mut registry)?;

            if cli.list_plugin {
                for p in loader.loaded() {
                    println!("{} {} {}", p.name, p.version, p.path.display());
                }
                return Ok(());
            }
        } else if cli.list_plugin {
            return Ok(());
        }
    }

    let base_offset = if cli.sector != 0 { cli.sector * cli.sector_size } else { cli.offset };

    // `--` subcommand mode never opens an input through the dispatcher
    // (some subcommands, like `gpt -- partitions`, build an image from
    // scratch), so it short-circuits before any of --peek/--unpack/--pack/
    // --search/positional-as-input resolution below.
    if !cli.sub_args.is_empty() {
        let forced_type = cli.r#type.as_deref();
        let req = Request {
            input: std::path::Path::new(""),
            base_offset,
            forced_type,
            action: Action::Main,
            sub_args: &cli.sub_args,
        };
        return dispatch::run(&mut ctx, &registry, &req);
    }

    if let Some(image) = &cli.peek {
        let out = require_positional(&cli)?;
        return run(&mut ctx, &registry, image, base_offset, cli.r#type.as_deref(), Action::Peek { out });
    }
    if let Some(image) = &cli.unpack {
        let out = cli.positional.clone();
        return run(&mut ctx, &registry, image, base_offset, cli.r#type.as_deref(), Action::Unpack { out });
    }
    if let Some(dir) = &cli.pack {
        let out = require_positional(&cli)?;
        return run(&mut ctx, &registry, dir, base_offset, cli.r#type.as_deref(), Action::Pack { out });
    }

    let input = cli.positional.clone().ok_or_else(|| anyhow!("missing input path"))?;

    if cli.search {
        let hits = search::scan(&mut ctx, &registry, &input, base_offset)?;
        print!("{}", search::format_table(&ctx, &hits));
        return Ok(());
    }

    run(&mut ctx, &registry, &input, base_offset, cli.r#type.as_deref(), Action::List)
}

fn require_positional(cli: &Cli) -> anyhow::Result<PathBuf>
{
    cli.positional.clone().ok_or_else(|| anyhow!("this action requires an output path"))
}

fn run(
    ctx: &mut Context,
    registry: &imgeditor::editor::registry::Registry,
    input: &std::path::Path,
    base_offset: u64,
    forced_type: Option<&str>,
    action: Action,
) -> anyhow::Result<()>
{
    let req = Request { input, base_offset, forced_type, action, sub_args: &[] };
    dispatch::run(ctx, registry, &req)
}

//! L5: the editor framework (spec sec. 3.1 / 3.2 / 4.1), grounded on the
//! `struct imgeditor` / `struct imgeditor_plugin` contract in
//! `examples/original_source/imgeditor.h`.

pub mod dispatch;
pub mod partition;
pub mod plugin;
pub mod registry;
pub mod search;

use std::any::Any;

use crate::context::Context;
use crate::vfs::VfHandle;

/// `IMGEDITOR_FLAG_*` from `imgeditor.h`, kept at their original bit
/// values.
pub mod flags {
    pub const SINGLE_BIN: u32 = 0;
    pub const CONTAIN_MULTI_BIN: u32 = 1 << 0;
    pub const HIDE_INFO_WHEN_LIST: u32 = 1 << 1;
}

/// Per-editor magic signature used by the search scanner (spec sec. 4.4).
/// `offset_in_header` is the byte offset inside the header where the
/// pattern is expected, matching `struct imgmagic`'s `magic_offset`.
#[derive(Clone, Copy)]
pub struct SearchMagic {
    pub pattern: &'static [u8],
    pub offset_in_header: usize,
}

/// Per-editor mutable state, allocated fresh by [`Editor::init`] and
/// released when [`Editor::exit`] runs (spec sec. 9's redesign note:
/// `Box<dyn EditorState>` in place of the original's compile-time-sized
/// `private_data` buffer).
pub type EditorState = Box<dyn Any + Send>;

/// The unit of pluggable behaviour (spec sec. 3.1). Every method may fail;
/// the framework's error-handling policy (spec sec. 7) is: editors return
/// `anyhow::Result`, the dispatcher logs once at the top of the callback
/// and aborts just that operation.
pub trait Editor: Send + Sync {
    fn name(&self) -> &'static str;
    fn descriptor(&self) -> &'static str;

    fn flags(&self) -> u32 { flags::SINGLE_BIN }

    /// Minimum input size below which detection is skipped.
    fn header_size(&self) -> usize;

    fn search_magic(&self) -> Option<SearchMagic> { None }

    /// Allocates this editor's private state. Called once per dispatch
    /// before `detect`.
    fn init(&self, _ctx: &mut Context) -> EditorState { Box::new(()) }

    /// Reads from the handle's current position (the framework seeks it to
    /// `filestart` on entry) and populates `state`. Must not rely on any
    /// byte beyond `header_size` being available.
    fn detect(
        &self,
        state: &mut EditorState,
        ctx: &mut Context,
        handle: VfHandle,
        force_type: bool,
    ) -> anyhow::Result<()>;

    /// Exact byte extent of the container, if known; required for `peek`.
    fn total_size(&self, _state: &EditorState, _ctx: &Context) -> Option<u64> { None }

    fn list(
        &self,
        _state: &mut EditorState,
        _ctx: &mut Context,
        _handle: VfHandle,
        _args: &[String],
    ) -> anyhow::Result<()>
    {
        anyhow::bail!("editor `{}` does not implement list", self.name())
    }

    /// `unpack` receives an output directory for multi-bin editors, or an
    /// output file path for single-bin editors.
    fn unpack(
        &self,
        _state: &mut EditorState,
        _ctx: &mut Context,
        _handle: VfHandle,
        _out: &std::path::Path,
        _args: &[String],
    ) -> anyhow::Result<()>
    {
        anyhow::bail!("editor `{}` does not implement unpack", self.name())
    }

    /// `pack` consumes the directory `unpack` prepared (or a freestanding
    /// source tree/file for editors that invent their own input shape,
    /// e.g. `uenv`).
    fn pack(
        &self,
        _state: &mut EditorState,
        _ctx: &mut Context,
        _input: &std::path::Path,
        _out: &mut std::fs::File,
        _args: &[String],
    ) -> anyhow::Result<()>
    {
        anyhow::bail!("editor `{}` does not implement pack", self.name())
    }

    /// Editor-specific subcommands (e.g. `gpt -- partitions <out> <spec>`).
    /// Unlike `list`/`unpack`/`pack`, the framework does not open any input
    /// through the virtual-file layer before calling this — some `main`
    /// subcommands build an image from scratch. Implementations that need
    /// to read an existing image open it themselves via `ctx.vfs`, taking
    /// the path from `args`.
    fn main(&self, _state: &mut EditorState, _ctx: &mut Context, _args: &[String]) -> anyhow::Result<()>
    {
        anyhow::bail!("editor `{}` does not implement a main subcommand", self.name())
    }

    /// Mandatory release point for any resources `init`/`detect` acquired
    /// outside ordinary `Drop` (e.g. unregistering partition tables).
    fn exit(&self, _state: EditorState, _ctx: &mut Context) {}
}

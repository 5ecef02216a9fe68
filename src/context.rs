//! The shared process-wide data area (spec sec. 3.4 / 6.6), re-architected
//! per spec sec. 9's recommended option: an explicit `Context` handle
//! threaded through every framework call, instead of the original's
//! `shm_open`+`mmap` region shared with dynamically loaded plugins.

use crate::editor::partition::PartitionRegistry;
use crate::vfs::Vfs;

/// Everything the dispatcher, the magic-search scanner, and every editor
/// callback (including ones loaded from a plugin) share for the duration
/// of one process invocation.
pub struct Context {
    pub verbose: u32,
    pub vfs: Vfs,
    pub partitions: PartitionRegistry,
    /// Set while the magic scanner is probing a candidate offset; editors'
    /// `detect` must not print diagnostics while this is true, even when
    /// `force_type` is also true (spec sec. 4.1's `in_search_mode` flag).
    pub in_search_mode: bool,
}

impl Context {
    pub fn new(verbose: u32) -> Self
    {
        Self {
            verbose,
            vfs: Vfs::new(),
            partitions: PartitionRegistry::new(),
            in_search_mode: false,
        }
    }

    /// `fprintf_if_force_type` (original source: `imgeditor.h`): only
    /// surfaces a diagnostic when the caller forced this editor AND the
    /// scanner isn't quietly probing.
    pub fn diagnose(&self, force_type: bool, msg: &str)
    {
        if force_type && !self.in_search_mode {
            tracing::warn!("{}", msg);
        } else {
            tracing::debug!("{}", msg);
        }
    }
}

impl Default for Context {
    fn default() -> Self { Self::new(0) }
}

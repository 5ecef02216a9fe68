//! Dynamically loaded plugin bundles (spec sec. 3.2 / 4.2 / 6.5), grounded
//! on `struct imgeditor_plugin` and `IMGEDITOR_PLUGIN_STRUCT_VERSION` in
//! `examples/original_source/imgeditor.h`, using `libloading` in place of
//! the original's raw `dlopen` (grounded in `Alb-O-xeno`'s use of the same
//! crate for its own dynamic extension points).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};

use super::{Editor, Registry};

/// `IMGEDITOR_PLUGIN_STRUCT_VERSION` from `imgeditor.h`. A plugin whose
/// descriptor reports a different value is rejected.
pub const PLUGIN_STRUCT_VERSION: u32 = 0x103;

/// The fixed symbol name every plugin bundle must export: a
/// `extern "C" fn() -> PluginDescriptor`.
pub const PLUGIN_ENTRY_SYMBOL: &[u8] = b"imgeditor_plugin_entry\0";

/// What a plugin's entry point hands back. Relies on host and plugin being
/// built against the same crate version, same as any Rust dylib-plugin
/// scheme that hands across `Box`/`Arc`-wrapped trait objects rather than
/// a hand-rolled C ABI — acceptable here per spec sec. 6.6's note that the
/// shared region "is not a documented stable ABI between plugin builds."
pub struct PluginDescriptor {
    pub version: u32,
    pub name: String,
    pub plugin_version: String,
    pub editors: Vec<Arc<dyn Editor>>,
}

type EntryFn = unsafe extern "C" fn() -> PluginDescriptor;

pub struct LoadedPlugin {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    // Kept alive for the process lifetime; the plugin's editors hold no
    // reference back into this, but unloading the library while an editor
    // object is still reachable would be unsound, so this field is never
    // dropped until the `PluginLoader` itself is.
    _lib: Library,
}

#[derive(Default)]
pub struct PluginLoader {
    loaded: Vec<LoadedPlugin>,
}

impl PluginLoader {
    pub fn new() -> Self { Self { loaded: Vec::new() } }

    pub fn loaded(&self) -> &[LoadedPlugin] { &self.loaded }

    /// Recursively walks `root`, `dlopen`-equivalent-loading every regular
    /// file whose name ends in the platform's shared-object suffix, and
    /// registers every editor a compliant plugin exports.
    pub fn load_dir(&mut self, root: &Path, registry: &mut Registry) -> anyhow::Result<()>
    {
        let suffix = std::env::consts::DLL_SUFFIX;
        let mut stack = vec![root.to_path_buf()];

        while let Some(dir) = stack.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(e) => e,
                Err(_) => continue,
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }

                if path.to_string_lossy().ends_with(suffix) {
                    if let Err(e) = self.load_one(&path, registry) {
                        tracing::warn!("plugin {} rejected: {:#}", path.display(), e);
                    }
                }
            }
        }

        Ok(())
    }

    fn load_one(&mut self, path: &Path, registry: &mut Registry) -> anyhow::Result<()>
    {
        // SAFETY: loading an arbitrary shared object and calling its
        // exported entry point is inherently unsafe; this mirrors the
        // trust model of the original's `dlopen`-based plugin loader.
        unsafe {
            let lib = Library::new(path)?;
            let entry: Symbol<EntryFn> = lib.get(PLUGIN_ENTRY_SYMBOL)?;
            let descriptor = entry();

            if descriptor.version != PLUGIN_STRUCT_VERSION {
                anyhow::bail!(
                    "version doesn't match (plugin {:#x}, framework {:#x})",
                    descriptor.version,
                    PLUGIN_STRUCT_VERSION
                );
            }

            for editor in descriptor.editors {
                registry.register(editor);
            }

            self.loaded.push(LoadedPlugin {
                name: descriptor.name,
                version: descriptor.plugin_version,
                path: path.to_path_buf(),
                _lib: lib,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dir_loads_nothing()
    {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = PluginLoader::new();
        let mut registry = Registry::new();

        loader.load_dir(dir.path(), &mut registry).unwrap();
        assert_eq!(loader.loaded().len(), 0);
        assert_eq!(registry.len(), 0);
    }
}

//! Editor registration (spec sec. 3.1 / 4.1's resolve-the-editor step,
//! testable property 1: registration idempotence).

use std::sync::Arc;

use super::Editor;

#[derive(Default)]
pub struct Registry {
    editors: Vec<Arc<dyn Editor>>,
}

impl Registry {
    pub fn new() -> Self { Self { editors: Vec::new() } }

    /// Registers `editor` at the end of the list. Duplicate names are
    /// permitted; `by_name` always returns the first match, so later
    /// registrations of the same name are silently shadowed — this is
    /// exactly how the original's dynamically loaded plugins coexist with
    /// statically registered editors of the same name (spec sec. 4.2).
    pub fn register(&mut self, editor: Arc<dyn Editor>)
    {
        self.editors.push(editor);
    }

    /// Registration order, preserved for the auto-detect iterator
    /// (spec sec. 4.1 step 4).
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Editor>>
    {
        self.editors.iter()
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<dyn Editor>>
    {
        self.editors.iter().find(|e| e.name() == name)
    }

    pub fn len(&self) -> usize { self.editors.len() }

    pub fn is_empty(&self) -> bool { self.editors.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::editor::EditorState;
    use crate::vfs::VfHandle;

    struct Stub(&'static str);
    impl Editor for Stub {
        fn name(&self) -> &'static str { self.0 }
        fn descriptor(&self) -> &'static str { "stub" }
        fn header_size(&self) -> usize { 0 }
        fn detect(
            &self,
            _s: &mut EditorState,
            _c: &mut Context,
            _h: VfHandle,
            _f: bool,
        ) -> anyhow::Result<()>
        {
            Ok(())
        }
    }

    /// Spec sec. 8.1: registration idempotence.
    #[test]
    fn lookup_matches_registered_editor()
    {
        let mut reg = Registry::new();
        reg.register(Arc::new(Stub("gpt")));
        reg.register(Arc::new(Stub("ext2")));

        assert_eq!(reg.by_name("gpt").unwrap().name(), "gpt");
        assert_eq!(reg.by_name("ext2").unwrap().name(), "ext2");

        let order: Vec<&str> = reg.iter().map(|e| e.name()).collect();
        assert_eq!(order, vec!["gpt", "ext2"]);
    }

    #[test]
    fn first_registration_wins_on_name_collision()
    {
        let mut reg = Registry::new();
        reg.register(Arc::new(Stub("dup")));
        reg.register(Arc::new(Stub("dup")));

        assert_eq!(reg.len(), 2);
        // by_name always returns the first match.
        assert!(std::ptr::eq(reg.by_name("dup").unwrap().as_ref(), reg.iter().next().unwrap().as_ref()));
    }
}

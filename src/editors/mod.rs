//! L6: the format decoders themselves, registered into one [`Registry`]
//! that the dispatcher resolves against (spec sec. 4.1 step 1).

pub mod android_boot;
pub mod ext234;
pub mod gpt;
pub mod uenv;

use std::sync::Arc;

use crate::editor::registry::Registry;

/// Registration order matters: `auto_detect` tries editors in this order
/// and stops at the first match, so narrower/cheaper-to-reject formats
/// should run before broad ones (spec sec. 4.1 step 4).
pub fn build_registry() -> Registry
{
    let mut registry = Registry::new();

    registry.register(Arc::new(gpt::GptEditor));
    registry.register(Arc::new(uenv::UenvEditor));
    registry.register(Arc::new(android_boot::AndroidBootEditor));
    registry.register(Arc::new(ext234::Ext234Editor));

    registry
}

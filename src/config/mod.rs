//! L4: config formats consumed by editor sidecars — the extended INI
//! parser and (via `serde_json`, already pulled in for structure
//! reflection) the JSON tree model.

pub mod exini;

pub use exini::{Ini, IniProperty, IniSection, IniValue};

//! L4: extended INI parser (spec sec. 3.7 / 4.6), grounded on
//! `examples/original_source/exini.h`.
//!
//! Per spec sec. 9's redesign note, the original's
//! `data_type` + `data`/`data_sz` flexible-array-member encoding collapses
//! into a single [`IniValue`] sum type.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum IniValue {
    Null,
    Ulong(u64),
    Text(String),
    /// Printable but unclassified, only produced when the enclosing `Ini`
    /// has `enable_unknown_data` set (`EXINI_PROP_DATA_TYPE_UNKNOWN`).
    Unknown(String),
    /// A decoder-specific handler classified this value outside the
    /// built-in tag space (`EXINI_PROP_DATA_TYPE_CUSTOM` band, `>= 0x80`
    /// in the original).
    Custom(String),
}

impl fmt::Display for IniValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            IniValue::Null => write!(f, ""),
            IniValue::Ulong(v) => write!(f, "{}", v),
            IniValue::Text(s) => write!(f, "\"{}\"", s),
            IniValue::Unknown(s) | IniValue::Custom(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Clone, Debug)]
pub struct IniProperty {
    pub name: String,
    pub value: IniValue,
}

#[derive(Clone, Debug)]
pub struct IniSection {
    pub name: String,
    pub global_index: usize,
    pub properties: Vec<IniProperty>,
}

impl IniSection {
    /// `exini_find_section_property`.
    pub fn find(&self, name: &str) -> Option<&IniProperty>
    {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// A decoder-specific classifier overriding the default `key = value`
/// interpretation (`exini_prop_handler_cb_t`). Returns `None` to fall back
/// to the default classifier.
pub type PropHandler = dyn Fn(&str, &str, &str) -> Option<IniValue>;

pub struct Ini {
    pub sections: Vec<IniSection>,
    pub enable_unknown_data: bool,
    handler: Option<Box<PropHandler>>,
}

impl Ini {
    pub fn new(enable_unknown_data: bool) -> Self
    {
        Self { sections: Vec::new(), enable_unknown_data, handler: None }
    }

    pub fn with_handler(mut self, handler: Box<PropHandler>) -> Self
    {
        self.handler = Some(handler);
        self
    }

    /// `exini_default_kv_handler`: classifies `value` as Null / quoted
    /// String / decimal-or-hex Ulong / (if enabled) Unknown text.
    pub fn default_kv_handler(enable_unknown: bool, value: &str) -> Option<IniValue>
    {
        if value.is_empty() {
            return Some(IniValue::Null);
        }
        if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            return Some(IniValue::Text(inner.to_string()));
        }
        if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
            if let Ok(v) = u64::from_str_radix(hex, 16) {
                return Some(IniValue::Ulong(v));
            }
        } else if let Ok(v) = value.parse::<u64>() {
            return Some(IniValue::Ulong(v));
        }

        if enable_unknown {
            Some(IniValue::Unknown(value.to_string()))
        } else {
            None
        }
    }

    fn classify(&self, section: &str, key: &str, value: &str) -> IniValue
    {
        if let Some(handler) = &self.handler {
            if let Some(v) = handler(section, key, value) {
                return v;
            }
        }
        Self::default_kv_handler(self.enable_unknown_data, value).unwrap_or(IniValue::Null)
    }

    /// `exini_load`: parses the extended-INI grammar from spec sec. 4.6.
    pub fn load(text: &str) -> anyhow::Result<Self>
    {
        Self::load_with(text, false)
    }

    pub fn load_with(text: &str, enable_unknown_data: bool) -> anyhow::Result<Self>
    {
        let mut ini = Ini::new(enable_unknown_data);
        let mut current: Option<IniSection> = None;

        for raw_line in text.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                if let Some(sec) = current.take() {
                    ini.sections.push(sec);
                }
                current = Some(IniSection {
                    name: name.to_string(),
                    global_index: ini.sections.len(),
                    properties: Vec::new(),
                });
                continue;
            }

            if let Some(body) = line.strip_prefix('{').and_then(|l| l.strip_suffix('}')) {
                if let Some(sec) = current.take() {
                    ini.sections.push(sec);
                }
                let mut anon = IniSection {
                    name: format!("{{{}}}", ini.sections.len()),
                    global_index: ini.sections.len(),
                    properties: Vec::new(),
                };
                for pair in body.split(',') {
                    if let Some((k, v)) = pair.split_once('=') {
                        let k = k.trim();
                        let v = v.trim();
                        let value = ini.classify(&anon.name, k, v);
                        anon.properties.push(IniProperty { name: k.to_string(), value });
                    }
                }
                ini.sections.push(anon);
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();
                let section = current.get_or_insert_with(|| IniSection {
                    name: String::new(),
                    global_index: ini.sections.len(),
                    properties: Vec::new(),
                });
                let classified = ini.classify(&section.name, key, value);
                section.properties.push(IniProperty { name: key.to_string(), value: classified });
            }
        }

        if let Some(sec) = current.take() {
            ini.sections.push(sec);
        }

        Ok(ini)
    }

    /// `exini_find_section_byid`.
    pub fn find_section_byid(&self, id: usize) -> Option<&IniSection>
    {
        self.sections.get(id)
    }

    /// `exini_find_section`.
    pub fn find_section(&self, name: &str) -> Option<&IniSection>
    {
        self.sections.iter().find(|s| s.name == name)
    }

    /// `exini_find_property`.
    pub fn find_property(&self, section_name: &str, prop_name: &str) -> Option<&IniProperty>
    {
        self.find_section(section_name)?.find(prop_name)
    }
}

fn strip_comment(line: &str) -> &str
{
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_types()
    {
        let text = r#"
            ; leading comment
            [disk]
            name = "boot"       ; trailing comment
            size = 0x1000
            empty =
            {uuid=deadbeef, kind=gpio}
        "#;

        let ini = Ini::load_with(text, true).unwrap();
        assert_eq!(ini.sections.len(), 2);

        let disk = ini.find_section("disk").unwrap();
        assert_eq!(disk.find("name").unwrap().value, IniValue::Text("boot".into()));
        assert_eq!(disk.find("size").unwrap().value, IniValue::Ulong(0x1000));
        assert_eq!(disk.find("empty").unwrap().value, IniValue::Null);

        let anon = ini.find_section_byid(1).unwrap();
        assert_eq!(anon.find("kind").unwrap().value, IniValue::Unknown("gpio".into()));
    }

    #[test]
    fn unknown_disabled_drops_unrecognized_values()
    {
        let ini = Ini::load_with("[a]\nk = gpio5\n", false).unwrap();
        assert_eq!(ini.find_property("a", "k").unwrap().value, IniValue::Null);
    }
}

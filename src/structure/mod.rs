//! L3: declarative struct reflection (spec sec. 3.5 / 4.5), grounded on
//! `examples/original_source/structure.h`'s `structure_item`/
//! `structure_print`/`structure_save_json`/`structure_load_json` contract.
//!
//! Per spec sec. 9's redesign note, the original's `offsetof`/`sizeof`
//! macro table becomes an ordinary builder over `(offset, size)` pairs, and
//! the function-pointer-per-field table becomes the [`field::FieldKind`]
//! dispatch enum.

pub mod field;

pub use field::{force_endian, FieldKind, ForceEndian};

/// `STRUCTURE_FLAG_NOT_SAVE`: the field is printed but excluded from the
/// JSON round trip.
pub const NOT_SAVED: u32 = 1 << 0;

#[derive(Clone)]
pub struct StructField {
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
    pub kind: FieldKind,
    pub flags: u32,
}

impl StructField {
    pub fn new(name: &'static str, offset: usize, size: usize, kind: FieldKind) -> Self
    {
        Self { name, offset, size, kind, flags: 0 }
    }

    pub fn not_saved(mut self) -> Self
    {
        self.flags |= NOT_SAVED;
        self
    }
}

/// An ordered table of [`StructField`]s describing one packed on-disk
/// struct. Built with a fluent `field(...)` builder instead of the
/// original's `STRUCTURE_ITEM`/`STRUCTURE_ITEM_END` macro pair.
#[derive(Clone, Default)]
pub struct StructDescriptor {
    fields: Vec<StructField>,
}

impl StructDescriptor {
    pub fn new() -> Self { Self { fields: Vec::new() } }

    pub fn field(mut self, field: StructField) -> Self
    {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[StructField] { &self.fields }

    /// `structure_print`: renders every field in declaration order.
    pub fn print(&self, base: &[u8]) -> String
    {
        let mut out = String::new();
        for f in &self.fields {
            let slice = &base[f.offset..f.offset + f.size];
            out.push_str(&f.kind.print(f.name, slice));
            out.push('\n');
        }
        out
    }

    /// `structure_save_json`: every field without [`NOT_SAVED`] becomes a
    /// JSON object key.
    pub fn save_json(&self, base: &[u8]) -> serde_json::Value
    {
        let mut map = serde_json::Map::new();
        for f in &self.fields {
            if f.flags & NOT_SAVED != 0 {
                continue;
            }
            let slice = &base[f.offset..f.offset + f.size];
            map.insert(f.name.to_string(), f.kind.save_json(slice));
        }
        serde_json::Value::Object(map)
    }

    /// `structure_load_json`: symmetric with [`save_json`]; a missing key
    /// for a non-`NOT_SAVED` field is an error.
    pub fn load_json(&self, json: &serde_json::Value, base: &mut [u8]) -> anyhow::Result<()>
    {
        use anyhow::anyhow;

        for f in &self.fields {
            if f.flags & NOT_SAVED != 0 {
                continue;
            }
            let value = json
                .get(f.name)
                .ok_or_else(|| anyhow!("missing JSON field `{}`", f.name))?;
            let slice = &mut base[f.offset..f.offset + f.size];
            f.kind.load_json(value, slice)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    struct Demo {
        a: u32,
        b: u16,
        name: [u8; 8],
    }

    fn descriptor() -> StructDescriptor
    {
        StructDescriptor::new()
            .field(StructField::new("a", 0, 4, FieldKind::Unsigned { width: 4, le: true }))
            .field(StructField::new("b", 4, 2, FieldKind::Hex { width: 2, le: true }))
            .field(StructField::new("name", 6, 8, FieldKind::Str))
    }

    fn encode(demo: &Demo) -> Vec<u8>
    {
        let mut buf = vec![0u8; std::mem::size_of::<Demo>()];
        buf[0..4].copy_from_slice(&demo.a.to_le_bytes());
        buf[4..6].copy_from_slice(&demo.b.to_le_bytes());
        buf[6..14].copy_from_slice(&demo.name);
        buf
    }

    /// Spec sec. 8.4: structure round-trip.
    #[test]
    fn round_trip()
    {
        let demo = Demo { a: 42, b: 0xBEEF, name: *b"hello\0\0\0" };
        let buf = encode(&demo);
        let d = descriptor();

        let json = d.save_json(&buf);
        let mut out = vec![0u8; buf.len()];
        d.load_json(&json, &mut out).unwrap();

        assert_eq!(out, buf);
    }

    #[test]
    fn not_saved_is_skipped()
    {
        let d = StructDescriptor::new().field(
            StructField::new("secret", 0, 4, FieldKind::Unsigned { width: 4, le: true })
                .not_saved(),
        );
        let buf = 7u32.to_le_bytes();
        let json = d.save_json(&buf);
        assert!(json.get("secret").is_none());
    }
}

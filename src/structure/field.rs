//! Built-in field printers/encoders/decoders (spec sec. 3.5 / 4.5),
//! grounded on the function set enumerated in
//! `examples/original_source/structure.h` (`structure_item_print_*`,
//! `structure_item_save_json_*`, `structure_item_load_json_*`) plus the
//! bit-flag/enum decorators spec sec. 3.5/4.5 name but `structure.h`
//! doesn't prototype (evidently ad hoc per format in the original).

use std::cell::Cell;

use crate::primitives::endian::{read_uint_be, read_uint_le};

thread_local! {
    /// Process-wide forced-endian override (spec sec. 4.5). A get-or-set
    /// API mirroring `structure_force_endian`, kept as a thread-local
    /// `Cell` rather than a raw global since the whole system is
    /// single-threaded per spec sec. 5.
    static FORCE_ENDIAN: Cell<ForceEndian> = Cell::new(ForceEndian::None);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ForceEndian {
    #[default]
    None,
    ForceLe,
    ForceBe,
}

/// Sets the process-wide forced-endian override, returning the previous
/// value (matches `structure_force_endian`'s get-or-set contract).
pub fn force_endian(set: ForceEndian) -> ForceEndian
{
    FORCE_ENDIAN.with(|c| c.replace(set))
}

pub fn current_force_endian() -> ForceEndian
{
    FORCE_ENDIAN.with(|c| c.get())
}

/// Resolves whether a field declared with native endianness `le` should
/// actually be read little-endian, honouring the forced override.
fn effective_le(declared_le: bool) -> bool
{
    match current_force_endian() {
        ForceEndian::None => declared_le,
        ForceEndian::ForceLe => true,
        ForceEndian::ForceBe => false,
    }
}

/// One field's presentation: how to print it, and how to round-trip it
/// through JSON. `width` for numeric kinds is 1/2/4/8 bytes.
#[derive(Clone)]
pub enum FieldKind {
    Unsigned { width: usize, le: bool },
    Hex { width: usize, le: bool },
    /// `(bit, label)` pairs; prints `0xHEX (LABEL1 LABEL2 …)`.
    BitFlags { width: usize, le: bool, labels: &'static [(u32, &'static str)] },
    /// `(value >> shift) & mask`, looked up in `labels`; prints
    /// `DEC (LABEL)` or `DEC (???)` when unmapped.
    Enum { width: usize, le: bool, shift: u32, mask: u32, labels: &'static [(u32, &'static str)] },
    /// Hex dump of the raw bytes (`x8_array`).
    HexArray,
    /// u16 array, LE or BE, decimal or hex per `hex`.
    U16Array { le: bool, hex: bool },
    /// u32 array, LE or BE, decimal or hex per `hex`.
    U32Array { le: bool, hex: bool },
    /// NUL-terminated (or `size`-bounded) ASCII string.
    Str,
    UnixEpoch,
}

fn read_width_uint(buf: &[u8], width: usize, le: bool) -> u64
{
    if le { read_uint_le(buf, width) } else { read_uint_be(buf, width) }
}

fn write_width_uint(buf: &mut [u8], width: usize, le: bool, v: u64)
{
    let bytes = v.to_le_bytes();
    if le {
        buf[..width].copy_from_slice(&bytes[..width]);
    } else {
        for i in 0..width {
            buf[i] = bytes[width - 1 - i];
        }
    }
}

impl FieldKind {
    pub fn print(&self, name: &str, buf: &[u8]) -> String
    {
        match self {
            FieldKind::Unsigned { width, le } => {
                format!("{} = {}", name, read_width_uint(buf, *width, effective_le(*le)))
            }
            FieldKind::Hex { width, le } => {
                format!("{} = {:#x}", name, read_width_uint(buf, *width, effective_le(*le)))
            }
            FieldKind::BitFlags { width, le, labels } => {
                let value = read_width_uint(buf, *width, effective_le(*le));
                let active: Vec<&str> = labels
                    .iter()
                    .filter(|(bit, _)| value & (1u64 << bit) != 0)
                    .map(|(_, label)| *label)
                    .collect();
                format!("{} = {:#x} ({})", name, value, active.join(" "))
            }
            FieldKind::Enum { width, le, shift, mask, labels } => {
                let raw = read_width_uint(buf, *width, effective_le(*le));
                let key = ((raw >> shift) as u32) & mask;
                let label = labels
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, l)| *l)
                    .unwrap_or("???");
                format!("{} = {} ({})", name, key, label)
            }
            FieldKind::HexArray => {
                let hex: Vec<String> = buf.iter().map(|b| format!("{:02x}", b)).collect();
                format!("{} = [{}]", name, hex.join(" "))
            }
            FieldKind::U16Array { le, hex } => {
                let vals: Vec<String> = buf
                    .chunks(2)
                    .filter(|c| c.len() == 2)
                    .map(|c| {
                        let v = read_width_uint(c, 2, effective_le(*le)) as u16;
                        if *hex { format!("{:#06x}", v) } else { v.to_string() }
                    })
                    .collect();
                format!("{} = [{}]", name, vals.join(" "))
            }
            FieldKind::U32Array { le, hex } => {
                let vals: Vec<String> = buf
                    .chunks(4)
                    .filter(|c| c.len() == 4)
                    .map(|c| {
                        let v = read_width_uint(c, 4, effective_le(*le)) as u32;
                        if *hex { format!("{:#010x}", v) } else { v.to_string() }
                    })
                    .collect();
                format!("{} = [{}]", name, vals.join(" "))
            }
            FieldKind::Str => {
                let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                format!("{} = \"{}\"", name, String::from_utf8_lossy(&buf[..end]))
            }
            FieldKind::UnixEpoch => {
                let secs = read_width_uint(buf, 4, effective_le(true));
                format!("{} = {} ({}s since epoch)", name, secs, secs)
            }
        }
    }

    pub fn save_json(&self, buf: &[u8]) -> serde_json::Value
    {
        use serde_json::Value;

        match self {
            FieldKind::Unsigned { width, le } => {
                Value::String(read_width_uint(buf, *width, effective_le(*le)).to_string())
            }
            FieldKind::Hex { width, le } | FieldKind::BitFlags { width, le, .. } => {
                Value::String(format!("{:#x}", read_width_uint(buf, *width, effective_le(*le))))
            }
            FieldKind::Enum { width, le, .. } => {
                Value::String(read_width_uint(buf, *width, effective_le(*le)).to_string())
            }
            FieldKind::HexArray => Value::Array(
                buf.iter().map(|b| Value::String(format!("{:#04x}", b))).collect(),
            ),
            FieldKind::U16Array { le, hex } => Value::Array(
                buf.chunks(2)
                    .filter(|c| c.len() == 2)
                    .map(|c| {
                        let v = read_width_uint(c, 2, effective_le(*le)) as u16;
                        if *hex {
                            Value::String(format!("{:#06x}", v))
                        } else {
                            Value::String(v.to_string())
                        }
                    })
                    .collect(),
            ),
            FieldKind::U32Array { le, hex } => Value::Array(
                buf.chunks(4)
                    .filter(|c| c.len() == 4)
                    .map(|c| {
                        let v = read_width_uint(c, 4, effective_le(*le)) as u32;
                        if *hex {
                            Value::String(format!("{:#010x}", v))
                        } else {
                            Value::String(v.to_string())
                        }
                    })
                    .collect(),
            ),
            FieldKind::Str => {
                let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                Value::String(String::from_utf8_lossy(&buf[..end]).into_owned())
            }
            FieldKind::UnixEpoch => {
                Value::String(read_width_uint(buf, 4, effective_le(true)).to_string())
            }
        }
    }

    pub fn load_json(&self, value: &serde_json::Value, buf: &mut [u8]) -> anyhow::Result<()>
    {
        use anyhow::{anyhow, Context as _};

        fn parse_uint(s: &str) -> anyhow::Result<u64>
        {
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).with_context(|| format!("bad hex integer {:?}", s))
            } else {
                s.parse::<u64>().with_context(|| format!("bad decimal integer {:?}", s))
            }
        }

        match self {
            FieldKind::Unsigned { width, le }
            | FieldKind::Hex { width, le }
            | FieldKind::BitFlags { width, le, .. }
            | FieldKind::Enum { width, le, .. } => {
                let s = value.as_str().ok_or_else(|| anyhow!("expected string field"))?;
                let v = parse_uint(s)?;
                write_width_uint(buf, *width, effective_le(*le), v);
                Ok(())
            }
            FieldKind::HexArray => {
                let arr = value.as_array().ok_or_else(|| anyhow!("expected array field"))?;
                for (i, elem) in arr.iter().enumerate() {
                    let s = elem.as_str().ok_or_else(|| anyhow!("expected hex string element"))?;
                    buf[i] = parse_uint(s)? as u8;
                }
                Ok(())
            }
            FieldKind::U16Array { le, .. } => {
                let arr = value.as_array().ok_or_else(|| anyhow!("expected array field"))?;
                for (i, elem) in arr.iter().enumerate() {
                    let s = elem.as_str().ok_or_else(|| anyhow!("expected string element"))?;
                    let v = parse_uint(s)?;
                    write_width_uint(&mut buf[i * 2..i * 2 + 2], 2, effective_le(*le), v);
                }
                Ok(())
            }
            FieldKind::U32Array { le, .. } => {
                let arr = value.as_array().ok_or_else(|| anyhow!("expected array field"))?;
                for (i, elem) in arr.iter().enumerate() {
                    let s = elem.as_str().ok_or_else(|| anyhow!("expected string element"))?;
                    let v = parse_uint(s)?;
                    write_width_uint(&mut buf[i * 4..i * 4 + 4], 4, effective_le(*le), v);
                }
                Ok(())
            }
            FieldKind::Str => {
                let s = value.as_str().ok_or_else(|| anyhow!("expected string field"))?;
                let bytes = s.as_bytes();
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                for b in buf.iter_mut().skip(n) {
                    *b = 0;
                }
                Ok(())
            }
            FieldKind::UnixEpoch => {
                let s = value.as_str().ok_or_else(|| anyhow!("expected string field"))?;
                let v = parse_uint(s)?;
                write_width_uint(buf, 4, effective_le(true), v);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Spec sec. 8.5: forced-endian toggle.
    #[test]
    fn forced_endian_toggle()
    {
        let buf = [0x00u8, 0x01, 0x02, 0x03];
        let field = FieldKind::Hex { width: 4, le: true };

        let prev = force_endian(ForceEndian::ForceBe);
        assert_eq!(field.print("v", &buf), "v = 0x10203");
        force_endian(prev);

        assert_eq!(field.print("v", &buf), "v = 0x3020100");
    }

    #[test]
    fn bit_flags_print()
    {
        let field = FieldKind::BitFlags {
            width: 4,
            le: true,
            labels: &[(0, "RO"), (1, "NOLOAD"), (2, "DISCARDABLE")],
        };
        let buf = 0x05u32.to_le_bytes();
        assert_eq!(field.print("flags", &buf), "flags = 0x5 (RO DISCARDABLE)");
    }

    #[test]
    fn json_round_trip_hex()
    {
        let field = FieldKind::Hex { width: 2, le: true };
        let buf = [0x34u8, 0x12];
        let json = field.save_json(&buf);
        assert_eq!(json, serde_json::Value::String("0x1234".into()));

        let mut out = [0u8; 2];
        field.load_json(&json, &mut out).unwrap();
        assert_eq!(out, buf);
    }
}

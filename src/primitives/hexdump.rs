//! `hexdump(buf, sz, baseaddr)` (original source: `imgeditor.h`) — a
//! classic 16-bytes-per-row hex + ASCII dump, used by `list` for raw
//! blocks the structure reflection layer doesn't have a field for.

use std::fmt::Write;

pub fn hexdump(buf: &[u8], base_addr: u64) -> String
{
    let mut out = String::new();

    for (row, chunk) in buf.chunks(16).enumerate() {
        let addr = base_addr + (row * 16) as u64;
        let _ = write!(out, "{:08x}  ", addr);

        for i in 0..16 {
            if i == 8 {
                out.push(' ');
            }
            match chunk.get(i) {
                Some(b) => { let _ = write!(out, "{:02x} ", b); }
                None => out.push_str("   "),
            }
        }

        out.push(' ');
        for &b in chunk {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' };
            out.push(c);
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumps_ascii_row()
    {
        let dump = hexdump(b"hello, world!!!!", 0);
        assert!(dump.starts_with("00000000  "));
        assert!(dump.contains("hello, world!!!!"));
    }

    #[test]
    fn honours_base_addr()
    {
        let dump = hexdump(&[0u8; 17], 0x100);
        assert!(dump.contains("00000100"));
        assert!(dump.contains("00000110"));
    }
}

//! LZO1X-1 decompression, used by the UBIFS decoder family for compressed
//! leaf-node blocks (spec sec. 6.7). This crate implements decompression
//! only; no editor in this tree currently depends on it (the UBI/UBIFS
//! decoders themselves are out of scope per spec.md sec. 1), but the
//! primitive is part of the reusable L1 set the spec calls out.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LzoError {
    #[error("truncated lzo1x stream")]
    Truncated,
    #[error("lzo1x match references data before the start of the output buffer")]
    BadMatchOffset,
}

/// Decompresses a single LZO1X-1 compressed block.
///
/// The format is a sequence of instructions: a literal run (raw bytes
/// copied verbatim) optionally followed by a back-reference match (copy
/// `length` bytes starting `distance` bytes behind the current output
/// position). Run lengths longer than a small inline range are extended
/// with a "gamma" continuation: zero bytes each worth 255, terminated by
/// a non-zero byte.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>, LzoError>
{
    let mut out = Vec::new();
    let mut ip = 0usize;
    let end = input.len();

    let read = |ip: usize| -> Result<u8, LzoError> {
        input.get(ip).copied().ok_or(LzoError::Truncated)
    };

    let read_length = |ip: &mut usize, mut t: usize| -> Result<usize, LzoError> {
        if t == 0 {
            let mut extra = read(*ip)?;
            *ip += 1;
            while extra == 0 {
                t += 255;
                extra = read(*ip)?;
                *ip += 1;
            }
            t += extra as usize;
        }
        Ok(t)
    };

    // First instruction: a literal run with a relaxed minimum length.
    let first = read(ip)?;
    ip += 1;
    let mut t;
    if first > 17 {
        t = first as usize - 17;
        if input.get(ip..ip + t).is_none() {
            return Err(LzoError::Truncated);
        }
        out.extend_from_slice(&input[ip..ip + t]);
        ip += t;
    } else {
        t = first as usize;
        if t >= 4 {
            t = read_length(&mut ip, t.saturating_sub(3))? + 3;
            if input.get(ip..ip + t).is_none() {
                return Err(LzoError::Truncated);
            }
            out.extend_from_slice(&input[ip..ip + t]);
            ip += t;
        } else if t > 0 {
            if input.get(ip..ip + t).is_none() {
                return Err(LzoError::Truncated);
            }
            out.extend_from_slice(&input[ip..ip + t]);
            ip += t;
        }
    }

    loop {
        if ip >= end {
            break;
        }

        let ctrl = read(ip)?;
        ip += 1;

        let (match_len, distance);

        if ctrl & 0xC0 != 0 {
            // 1MMDDDSS: 2-byte match, distance 1..1024, length 2..5.
            match_len = ((ctrl >> 5) & 0x3) as usize + 2;
            let low = read(ip)?;
            ip += 1;
            distance = (((ctrl as usize >> 2) & 0x7) << 8) + low as usize + 1;
        } else if ctrl & 0x20 != 0 {
            // 001LLLLL: length 2..33 (extended via gamma), 2-byte distance.
            let mut len = (ctrl & 0x1F) as usize;
            len = read_length(&mut ip, len)? + 2;
            let b0 = read(ip)? as usize;
            ip += 1;
            let b1 = read(ip)? as usize;
            ip += 1;
            distance = ((b1 << 6) | (b0 >> 2)) + 1;
            match_len = len;
        } else if ctrl & 0x10 != 0 {
            // 0001HLLL: length 3..4 short or extended, long-distance match.
            let h = (ctrl & 0x08) != 0;
            let mut len = (ctrl & 0x7) as usize;
            len = read_length(&mut ip, len)? + 2;
            let b0 = read(ip)? as usize;
            ip += 1;
            let b1 = read(ip)? as usize;
            ip += 1;
            let base = if h { 0x4000 } else { 0 };
            distance = base + ((b1 << 6) | (b0 >> 2)) + 1;
            match_len = len;
            if distance == 0x4000 {
                // End-of-stream marker.
                break;
            }
        } else {
            // 0000LLLL with L==0 marks a literal-length extension; this
            // path only reaches here if t (literal count) was 0 after a
            // match, meaning "no trailing literal, read next instruction".
            let len = read_length(&mut ip, (ctrl & 0xF) as usize)? + 3;
            if input.get(ip..ip + len).is_none() {
                return Err(LzoError::Truncated);
            }
            out.extend_from_slice(&input[ip..ip + len]);
            ip += len;
            continue;
        }

        if distance > out.len() {
            return Err(LzoError::BadMatchOffset);
        }
        let start = out.len() - distance;
        for i in 0..match_len {
            let b = out[start + i];
            out.push(b);
        }

        // Trailing literal run, encoded in the low 2 bits of `ctrl` for the
        // short-match forms; read it from the byte stream when nonzero.
        t = (ctrl & 0x3) as usize;
        if t > 0 {
            if input.get(ip..ip + t).is_none() {
                return Err(LzoError::Truncated);
            }
            out.extend_from_slice(&input[ip..ip + t]);
            ip += t;
        }
    }

    Ok(out)
}

/// Encodes `data` as a single LZO1X-1 literal run (no back-references).
/// Valid, always-decodable input for [`decompress`]; used for round-trip
/// tests and by callers that only need the container format, not the
/// compression ratio a real LZO encoder would provide.
pub fn compress_literal(data: &[u8]) -> Vec<u8>
{
    let mut out = Vec::new();
    let len = data.len();

    if len <= 238 {
        out.push((len + 17) as u8);
    } else {
        out.push(0);
        let mut rem = len - 17 - 3;
        while rem > 255 {
            out.push(0);
            rem -= 255;
        }
        out.push(rem as u8);
    }
    out.extend_from_slice(data);

    // End-of-stream marker: a long-distance match with distance 0x4000.
    out.push(0x11);
    out.push(0x00);
    out.push(0x00);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_round_trip()
    {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let compressed = compress_literal(&data);
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn empty_literal_round_trip()
    {
        let compressed = compress_literal(&[]);
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, Vec::<u8>::new());
    }
}

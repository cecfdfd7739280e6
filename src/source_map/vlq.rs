//! Base64 VLQ codec used by the `mappings` field

use super::{SourceMapError, SourceMapResult};

const BASE64_CHARS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const VLQ_BASE_SHIFT: u32 = 5;
const VLQ_BASE: i64 = 1 << VLQ_BASE_SHIFT;
const VLQ_BASE_MASK: i64 = VLQ_BASE - 1;
const VLQ_CONTINUATION_BIT: i64 = VLQ_BASE;

fn base64_value(c: u8) -> Option<i64> {
    let value = match c {
        b'A'..=b'Z' => c - b'A',
        b'a'..=b'z' => c - b'a' + 26,
        b'0'..=b'9' => c - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(value as i64)
}

/// Append the VLQ encoding of `value` to `out`
pub fn encode(
    value: i64,
    out: &mut String,
) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = vlq & VLQ_BASE_MASK;
        vlq >>= VLQ_BASE_SHIFT;
        if vlq > 0 {
            digit |= VLQ_CONTINUATION_BIT;
        }
        out.push(BASE64_CHARS[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Decode every value of one comma-free segment
pub fn decode_segment(segment: &str) -> SourceMapResult<Vec<i64>> {
    let mut values = Vec::with_capacity(5);
    let mut value = 0i64;
    let mut shift = 0u32;
    let mut pending = false;

    for c in segment.bytes() {
        let digit = base64_value(c).ok_or_else(|| SourceMapError::Vlq {
            segment: segment.to_string(),
            message: format!("invalid base64 character {:?}", c as char),
        })?;
        if shift > 60 {
            return Err(SourceMapError::Vlq {
                segment: segment.to_string(),
                message: "value overflows 64 bits".to_string(),
            });
        }
        value += (digit & VLQ_BASE_MASK) << shift;
        if digit & VLQ_CONTINUATION_BIT != 0 {
            shift += VLQ_BASE_SHIFT;
            pending = true;
        } else {
            let negative = value & 1 == 1;
            let magnitude = value >> 1;
            values.push(if negative { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
            pending = false;
        }
    }

    if pending {
        return Err(SourceMapError::Vlq {
            segment: segment.to_string(),
            message: "truncated value".to_string(),
        });
    }
    Ok(values)
}

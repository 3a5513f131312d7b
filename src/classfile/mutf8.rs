//! Modified UTF-8, the string encoding of `CONSTANT_Utf8` entries.
//!
//! It differs from standard UTF-8 in two places: the NUL character is encoded as the two byte
//! sequence `C0 80`, and supplementary characters are encoded as a surrogate pair of three byte
//! sequences instead of a single four byte sequence.

use crate::Result;

/// Encode `value` as modified UTF-8.
#[must_use]
pub fn encode(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Decode modified UTF-8 bytes.
///
/// Unpaired surrogates are replaced with `U+FFFD`; they are legal in the format but cannot be
/// represented by a Rust `String`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on truncated or invalid byte sequences.
pub fn decode(bytes: &[u8]) -> Result<String> {
    if bytes.is_ascii() && !bytes.contains(&0) {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        let first = u16::from(bytes[index]);
        match bytes[index] {
            0x01..=0x7F => {
                units.push(first);
                index += 1;
            }
            0xC0..=0xDF => {
                let second = continuation(bytes, index + 1)?;
                units.push(((first & 0x1F) << 6) | second);
                index += 2;
            }
            0xE0..=0xEF => {
                let second = continuation(bytes, index + 1)?;
                let third = continuation(bytes, index + 2)?;
                units.push(((first & 0x0F) << 12) | (second << 6) | third);
                index += 3;
            }
            other => {
                return Err(malformed_error!(
                    "Invalid modified UTF-8 byte 0x{:02X} at {}",
                    other,
                    index
                ))
            }
        }
    }

    Ok(String::from_utf16_lossy(&units))
}

fn continuation(bytes: &[u8], index: usize) -> Result<u16> {
    match bytes.get(index) {
        Some(byte) if byte & 0xC0 == 0x80 => Ok(u16::from(byte & 0x3F)),
        Some(byte) => Err(malformed_error!(
            "Invalid modified UTF-8 continuation byte 0x{:02X} at {}",
            byte,
            index
        )),
        None => Err(malformed_error!("Truncated modified UTF-8 sequence")),
    }
}

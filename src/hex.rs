use core::{fmt, num::ParseIntError};
use heapless::Vec;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";
const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

pub fn decode_hex<const N: usize>(s: &str) -> Result<Vec<u8, N>, DecodeHexError> {
    if s.len() % 2 != 0 {
        return Err(DecodeHexError::OddLength);
    }
    let mut out = Vec::new();
    for i in (0..s.len()).step_by(2) {
        let byte = s
            .get(i..i + 2)
            .ok_or(DecodeHexError::OddLength)
            .and_then(|pair| u8::from_str_radix(pair, 16).map_err(DecodeHexError::ParseInt))?;
        out.push(byte).map_err(|_| DecodeHexError::Overflow)?;
    }
    Ok(out)
}

/// Append the upper-case hex representation of `bytes` to `out`.
///
/// On error `out` is truncated back to its original length.
pub fn encode_hex<const N: usize>(bytes: &[u8], out: &mut Vec<u8, N>) -> Result<(), EncodeError> {
    let start = out.len();
    if out.capacity() - start < bytes.len() * 2 {
        return Err(EncodeError);
    }
    for b in bytes {
        // Capacity was checked above
        out.push(HEX_DIGITS[(b >> 4) as usize]).ok();
        out.push(HEX_DIGITS[(b & 0x0f) as usize]).ok();
    }
    Ok(())
}

pub const fn base64_len(len: usize) -> usize {
    (len + 2) / 3 * 4
}

/// Append the padded standard base64 representation of `bytes` to `out`.
pub fn encode_base64<const N: usize>(
    bytes: &[u8],
    out: &mut Vec<u8, N>,
) -> Result<(), EncodeError> {
    if out.capacity() - out.len() < base64_len(bytes.len()) {
        return Err(EncodeError);
    }
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;

        out.push(BASE64_ALPHABET[(triple >> 18) as usize & 0x3f]).ok();
        out.push(BASE64_ALPHABET[(triple >> 12) as usize & 0x3f]).ok();
        if chunk.len() > 1 {
            out.push(BASE64_ALPHABET[(triple >> 6) as usize & 0x3f]).ok();
        } else {
            out.push(b'=').ok();
        }
        if chunk.len() > 2 {
            out.push(BASE64_ALPHABET[triple as usize & 0x3f]).ok();
        } else {
            out.push(b'=').ok();
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncodeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeHexError {
    OddLength,
    Overflow,
    ParseInt(ParseIntError),
}

impl fmt::Display for DecodeHexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeHexError::OddLength => "input string has an odd number of bytes".fmt(f),
            DecodeHexError::Overflow => "output buffer is too small".fmt(f),
            DecodeHexError::ParseInt(e) => e.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_encode() {
        let mut out: Vec<u8, 16> = Vec::new();
        encode_hex(b"\x01\xabZ", &mut out).unwrap();
        assert_eq!(&out[..], b"01AB5A");
    }

    #[test]
    fn hex_encode_too_small_leaves_buffer() {
        let mut out: Vec<u8, 4> = Vec::new();
        out.extend_from_slice(b"xy").unwrap();
        assert_eq!(encode_hex(b"abc", &mut out), Err(EncodeError));
        assert_eq!(&out[..], b"xy");
    }

    #[test]
    fn hex_decode() {
        let v: Vec<u8, 8> = decode_hex("7B7d").unwrap();
        assert_eq!(&v[..], b"{}");
        assert_eq!(decode_hex::<8>("7B7"), Err(DecodeHexError::OddLength));
        assert_eq!(decode_hex::<1>("7B7D"), Err(DecodeHexError::Overflow));
        assert!(matches!(
            decode_hex::<8>("zz"),
            Err(DecodeHexError::ParseInt(_))
        ));
    }

    #[test]
    fn base64_padding() {
        let mut out: Vec<u8, 32> = Vec::new();
        encode_base64(b"Man", &mut out).unwrap();
        assert_eq!(&out[..], b"TWFu");

        out.clear();
        encode_base64(b"Ma", &mut out).unwrap();
        assert_eq!(&out[..], b"TWE=");

        out.clear();
        encode_base64(b"M", &mut out).unwrap();
        assert_eq!(&out[..], b"TQ==");

        out.clear();
        encode_base64(b"", &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn base64_too_small() {
        let mut out: Vec<u8, 3> = Vec::new();
        assert_eq!(encode_base64(b"Man", &mut out), Err(EncodeError));
        assert!(out.is_empty());
    }
}

//! Codecs for the two binary atomic types (hexBinary, base64Binary)

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fmt::Write;

/// Decode a hexBinary lexical form (case-insensitive, even length).
pub fn decode_hex(lexical: &str) -> Result<Vec<u8>> {
    if lexical.len() % 2 != 0 {
        return Err(Error::invalid_binary("hexBinary", "odd number of digits"));
    }
    let bytes = lexical.as_bytes();
    let mut out = Vec::with_capacity(lexical.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let hi = hex_digit(pair[0])?;
        let lo = hex_digit(pair[1])?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn hex_digit(b: u8) -> Result<u8> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(Error::invalid_binary(
            "hexBinary",
            format!("invalid digit {:?}", b as char),
        )),
    }
}

/// Encode bytes as an uppercase hexBinary lexical form.
pub fn encode_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for b in data {
        // write! into a String cannot fail
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Decode a base64Binary lexical form.
pub fn decode_base64(lexical: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(lexical)
        .map_err(|e| Error::invalid_binary("base64Binary", e.to_string()))
}

/// Encode bytes as a base64Binary lexical form.
pub fn encode_base64(data: &[u8]) -> String {
    BASE64.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let data = vec![0x00, 0xff, 0x10, 0xab];
        let encoded = encode_hex(&data);
        assert_eq!(encoded, "00FF10AB");
        assert_eq!(decode_hex(&encoded).unwrap(), data);
        assert_eq!(decode_hex("00ff10ab").unwrap(), data);
    }

    #[test]
    fn test_hex_rejects_bad_input() {
        assert!(decode_hex("0").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_base64_round_trip() {
        let data = b"soniq".to_vec();
        let encoded = encode_base64(&data);
        assert_eq!(decode_base64(&encoded).unwrap(), data);
        assert!(decode_base64("!!!").is_err());
    }
}

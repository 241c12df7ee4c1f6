//! Binary-to-text transport encoding for media frames and audio payloads

use crate::{CallError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Encode raw bytes as standard, padded base64
pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode base64 text back into raw bytes
pub fn decode(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text)
        .map_err(|e| CallError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_empty() {
        assert_eq!(encode(&[]), "");
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_round_trip_single_byte() {
        let encoded = encode(&[0xAB]);
        assert_eq!(encoded, "qw==");
        assert_eq!(decode(&encoded).unwrap(), vec![0xAB]);
    }

    #[test]
    fn test_round_trip_large_buffer() {
        // Deterministic pseudo-random bytes (xorshift)
        let mut state: u32 = 0x9E37_79B9;
        let bytes: Vec<u8> = (0..65_537)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();

        assert_eq!(decode(&encode(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn test_malformed_input_fails() {
        let err = decode("not base64!").unwrap_err();
        assert!(matches!(err, CallError::Decode(_)));
    }
}

//! Hex helpers
//! Uppercase encoding for octet string values and lenient decoding for CLI input

use std::fmt::Write;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HexError {
    #[error("odd number of hex digits: {0}")]
    OddLength(usize),

    #[error("invalid hex digit '{ch}' at position {pos}")]
    InvalidDigit { ch: char, pos: usize },
}

/// Encode bytes to uppercase hex string
/// Example: [0x12, 0x34, 0xAB] -> "1234AB"
pub fn encode_upper(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 2);
    for byte in data {
        // Writing to String buffer is infallible
        let _ = write!(&mut result, "{:02X}", byte);
    }
    result
}

/// Decode a hex string, ignoring ASCII whitespace between digits
/// Example: "1B 1b 01" -> [0x1B, 0x1B, 0x01]
pub fn decode(input: &str) -> Result<Vec<u8>, HexError> {
    let digits: Vec<(usize, char)> = input
        .char_indices()
        .filter(|(_, c)| !c.is_ascii_whitespace())
        .collect();

    if digits.len() % 2 != 0 {
        return Err(HexError::OddLength(digits.len()));
    }

    let nibble = |(pos, ch): (usize, char)| {
        ch.to_digit(16)
            .map(|d| d as u8)
            .ok_or(HexError::InvalidDigit { ch, pos })
    };

    digits
        .chunks_exact(2)
        .map(|pair| Ok((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

//! Hex encoding for binary CSV cells

use std::fmt::Write;

/// Encode bytes to uppercase hex
/// Example: [0x12, 0x34, 0xAB] -> "1234AB"
pub fn encode_upper(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 2);
    for byte in data {
        // Writing to a String cannot fail
        let _ = write!(&mut result, "{:02X}", byte);
    }
    result
}

/// Binary literal the way SQL Server prints a varbinary: `0x` + uppercase hex
pub fn binary_literal(data: &[u8]) -> String {
    format!("0x{}", encode_upper(data))
}

//! Utility functions and helpers

pub mod time;

use anyhow::Result;

/// Convert bytes to a hexadecimal string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse a hexadecimal string (whitespace and an optional `0x` prefix allowed)
pub fn hex_to_bytes(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let digits: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();

    if digits.len() % 2 != 0 {
        anyhow::bail!("odd number of hex digits");
    }

    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair)?;
            u8::from_str_radix(pair, 16).map_err(|e| anyhow::anyhow!("invalid hex '{}': {}", pair, e))
        })
        .collect()
}

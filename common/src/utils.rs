use anyhow::{Context, Result};
use bytes::Bytes;

/// Decode a payload as UTF-8.
pub fn string_from_bytes(bytes: Bytes) -> Result<String> {
    String::from_utf8(bytes.to_vec()).context("payload is not valid UTF-8")
}

/// Parse a payload holding the decimal form of a non-negative integer.
pub fn u64_from_bytes(bytes: Bytes) -> Result<u64> {
    let s = string_from_bytes(bytes)?;
    s.trim()
        .parse::<u64>()
        .with_context(|| format!("`{}` is not a non-negative integer", s.trim()))
}

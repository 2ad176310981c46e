//! Packed bitmap expansion

use crate::error::FormatError;

/// Expand `bit_count` bits, least significant bit of each byte first
pub fn unpack(bytes: &[u8], bit_count: usize) -> Result<Vec<bool>, FormatError> {
    let needed = bit_count.div_ceil(8);
    if bytes.len() < needed {
        return Err(FormatError::Truncated {
            needed,
            available: bytes.len(),
        });
    }

    Ok((0..bit_count)
        .map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1)
        .collect())
}

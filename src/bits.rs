//! Bit, byte and digit-string helpers shared by the codec modules.
//!
//! Blocks travel through the codec as `u64`/`u128` values. These helpers
//! cover the conversions the surrounding protocol needs: fixed-width hex for
//! keys and blocks, BCD digit strings for the key-derivation blocks, bit-field
//! slicing, and digit grouping for display.

use crate::error::{TokenError, TokenResult};

/// Mask with the low `width` bits set.
pub(crate) const fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Extract `width` bits starting at bit `offset` (counted from the LSB).
pub(crate) fn bit_field(value: u64, offset: u32, width: u32) -> u64 {
    (value >> offset) & mask(width)
}

/// Read bit `pos` (counted from the LSB) of a wide value.
pub(crate) fn bit(value: u128, pos: u32) -> u128 {
    (value >> pos) & 1
}

/// Overwrite bit `pos` (counted from the LSB) of a wide value.
pub(crate) fn with_bit(value: u128, pos: u32, set: u128) -> u128 {
    (value & !(1u128 << pos)) | ((set & 1) << pos)
}

/// Render a 64-bit block as 16 upper-case hex digits.
pub fn block_to_hex(block: u64) -> String {
    hex::encode_upper(block.to_be_bytes())
}

/// Parse exactly 16 hex digits into a 64-bit block.
pub fn block_from_hex(s: &str) -> TokenResult<u64> {
    let bytes = hex::decode(s.trim())?;
    let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
        TokenError::InvalidHex(format!("expected 16 hex digits, got {}", s.trim().len()))
    })?;
    Ok(u64::from_be_bytes(arr))
}

/// Read a string of 16 decimal digits as 8 BCD bytes.
pub(crate) fn bcd_block(digits: &str) -> TokenResult<u64> {
    if digits.len() != 16 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TokenError::InvalidHex(format!(
            "expected 16 BCD digits, got {digits:?}"
        )));
    }
    block_from_hex(digits)
}

/// Split a digit string into dash-separated runs of `group` characters.
pub fn group_digits(digits: &str, group: usize) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / group.max(1));
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && group > 0 && i % group == 0 {
            out.push('-');
        }
        out.push(c);
    }
    out
}

//! Class-bit transposition.
//!
//! The 2-bit class code is prepended to the 64-bit ciphertext and then moved
//! into the middle of the 66-bit value, so it is not sitting at the boundary
//! where it was inserted. Bit numbering below is from the LSB of the 66-bit
//! value:
//!
//! ```text
//! insert: bit65 <- bit28, bit64 <- bit27, bit28 <- class.hi, bit27 <- class.lo
//! remove: read class from bits 28/27, restore them from bits 65/64, drop 65/64
//! ```
//!
//! Decimal token numbers are transported as a 68-bit (hex-aligned) value,
//! so the two bits above the 66-bit token must always be zero.

use crate::bits::{bit, with_bit};
use crate::block::TokenClass;
use crate::error::{TokenError, TokenResult};

/// Width of a transposed token: class code plus ciphertext.
pub const TOKEN_BITS: u32 = 66;

/// Width of the hex-aligned transport form of a token.
pub const TRANSPORT_BITS: u32 = 68;

/// Positions receiving the class code.
const CLASS_HI_POS: u32 = 28;
const CLASS_LO_POS: u32 = 27;

/// Positions the class code occupies before transposition.
const TOP_HI_POS: u32 = TOKEN_BITS - 1;
const TOP_LO_POS: u32 = TOKEN_BITS - 2;

/// Prepend `class` to `ciphertext` and hide it at bits 28/27.
pub fn insert_class_bits(ciphertext: u64, class: TokenClass) -> u128 {
    let class = class.bits() as u128;
    let combined = (class << 64) | ciphertext as u128;

    let mut out = with_bit(combined, TOP_HI_POS, bit(combined, CLASS_HI_POS));
    out = with_bit(out, TOP_LO_POS, bit(combined, CLASS_LO_POS));
    out = with_bit(out, CLASS_HI_POS, class >> 1);
    with_bit(out, CLASS_LO_POS, class)
}

/// Read the class code of a transposed token without touching the ciphertext.
pub fn class_bits(transposed: u128) -> TokenClass {
    let code = (bit(transposed, CLASS_HI_POS) << 1) | bit(transposed, CLASS_LO_POS);
    match code {
        0 => TokenClass::Credit,
        1 => TokenClass::NonMeterSpecific,
        2 => TokenClass::MeterSpecific,
        _ => TokenClass::Reserved,
    }
}

/// Undo [`insert_class_bits`], returning the ciphertext and class code.
///
/// # Errors
/// Returns [`TokenError::TransportPadding`] if any bit above the 66-bit
/// token is set, i.e. the 68-bit transport form was not zero-padded.
pub fn remove_class_bits(transposed: u128) -> TokenResult<(u64, TokenClass)> {
    if transposed >> TOKEN_BITS != 0 {
        return Err(TokenError::TransportPadding);
    }
    let class = class_bits(transposed);

    let mut restored = with_bit(transposed, CLASS_HI_POS, bit(transposed, TOP_HI_POS));
    restored = with_bit(restored, CLASS_LO_POS, bit(transposed, TOP_LO_POS));

    Ok((restored as u64, class))
}

//! Amount field codec.
//!
//! A 16-bit field holds a 2-bit exponent and a 14-bit mantissa. Quantities
//! are carried in tenths of a unit. Each exponent selects a successive
//! decade of 16 384 steps:
//!
//! ```text
//! tenths = mantissa * 10^e + sum_{i=1..e} 2^14 * 10^(i-1)
//! ```
//!
//! so exponent 0 covers 0..=16 383 in steps of 1, exponent 1 covers
//! 16 384..=180 214 in steps of 10, and so on up to 18 201 624 tenths
//! (1 820 162.4 units).

use crate::error::{TokenError, TokenResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width of the mantissa sub-field.
pub const MANTISSA_BITS: u32 = 14;

/// Largest mantissa value.
pub const MANTISSA_MAX: u32 = (1 << MANTISSA_BITS) - 1;

/// Largest encodable quantity, in tenths.
pub const MAX_TENTHS: u32 = 18_201_624;

/// Upper bound (inclusive, in tenths) of exponents 0, 1 and 2.
const EXPONENT_LIMITS: [u32; 3] = [16_383, 180_214, 1_818_524];

/// A non-negative quantity in tenths of a unit, within the encodable range.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub struct Amount(u32);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX: Amount = Amount(MAX_TENTHS);

    /// Build from a count of tenths.
    pub fn from_tenths(tenths: u32) -> TokenResult<Self> {
        if tenths > MAX_TENTHS {
            return Err(TokenError::AmountOutOfRange(format!(
                "{} tenths exceeds {}",
                tenths, MAX_TENTHS
            )));
        }
        Ok(Self(tenths))
    }

    /// Build from a quantity in whole units, keeping `floor(value * 10)`.
    pub fn from_units(value: f64) -> TokenResult<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(TokenError::AmountOutOfRange(value.to_string()));
        }
        let tenths = (value * 10.0).floor();
        if tenths > MAX_TENTHS as f64 {
            return Err(TokenError::AmountOutOfRange(value.to_string()));
        }
        Ok(Self(tenths as u32))
    }

    pub fn tenths(self) -> u32 {
        self.0
    }

    pub fn as_units(self) -> f64 {
        self.0 as f64 / 10.0
    }
}

impl TryFrom<u32> for Amount {
    type Error = TokenError;

    fn try_from(tenths: u32) -> TokenResult<Self> {
        Amount::from_tenths(tenths)
    }
}

impl From<Amount> for u32 {
    fn from(amount: Amount) -> u32 {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

/// Parses a decimal quantity such as `"692.5"`. Digits past the first
/// fractional place are truncated, matching [`Amount::from_units`].
impl FromStr for Amount {
    type Err = TokenError;

    fn from_str(s: &str) -> TokenResult<Self> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        let digits_ok = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !digits_ok(whole) || !digits_ok(frac) {
            return Err(TokenError::AmountOutOfRange(format!("not a decimal quantity: {s:?}")));
        }

        let whole: u64 = whole
            .parse()
            .map_err(|_| TokenError::AmountOutOfRange(s.to_string()))?;
        let tenth = frac.bytes().next().map(|b| (b - b'0') as u64).unwrap_or(0);
        let tenths = whole
            .checked_mul(10)
            .and_then(|t| t.checked_add(tenth))
            .filter(|&t| t <= MAX_TENTHS as u64)
            .ok_or_else(|| TokenError::AmountOutOfRange(s.to_string()))?;

        Ok(Amount(tenths as u32))
    }
}

/// Exponent for a quantity in tenths; the first matching decade wins.
pub fn exponent_for(tenths: u32) -> u8 {
    EXPONENT_LIMITS
        .iter()
        .position(|&limit| tenths <= limit)
        .unwrap_or(EXPONENT_LIMITS.len()) as u8
}

/// Sum of the decades below `exponent`: `sum_{i=1..e} 2^14 * 10^(i-1)`.
pub fn decade_offset(exponent: u8) -> u32 {
    (1..=exponent as u32)
        .map(|i| (1u32 << MANTISSA_BITS) * 10u32.pow(i - 1))
        .sum()
}

/// Encode an amount into its 16-bit exponent/mantissa field.
///
/// # Errors
/// Returns [`TokenError::AmountNotRepresentable`] when the mantissa for the
/// selected exponent is not an integer in `0..=16383`.
pub fn encode(amount: Amount) -> TokenResult<u16> {
    let tenths = amount.tenths();
    let exponent = exponent_for(tenths);
    let not_representable = TokenError::AmountNotRepresentable { tenths, exponent };

    let scaled = tenths
        .checked_sub(decade_offset(exponent))
        .ok_or_else(|| not_representable.clone())?;
    let step = 10u32.pow(exponent as u32);
    if scaled % step != 0 || scaled / step > MANTISSA_MAX {
        return Err(not_representable);
    }
    let mantissa = scaled / step;

    Ok(((exponent as u16) << MANTISSA_BITS) | mantissa as u16)
}

/// Decode a 16-bit amount field. Every field value decodes to an amount
/// within range.
pub fn decode(field: u16) -> Amount {
    let exponent = (field >> MANTISSA_BITS) as u8;
    let mantissa = (field as u32) & MANTISSA_MAX;
    Amount(mantissa * 10u32.pow(exponent as u32) + decade_offset(exponent))
}

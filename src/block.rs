//! Token block encoder and field extraction.
//!
//! The 64-bit plaintext is laid out most-significant first:
//!
//! ```text
//!  63        52 51                32 31          16 15           0
//! +------------+--------------------+--------------+--------------+
//! | random(12) |      TID(20)       |  amount(16)  |   CRC(16)    |
//! +------------+--------------------+--------------+--------------+
//! ```
//!
//! The 2-bit class code is not part of these 64 bits; it rides alongside the
//! ciphertext in the token number. It is still covered by the CRC, which is
//! computed over `class ∥ random ∥ TID ∥ amount` (50 bits, zero-extended to
//! 7 bytes).

use crate::amount::{self, Amount};
use crate::bits::{self, bit_field, mask};
use crate::crc::crc16;
use crate::error::{TokenError, TokenResult};
use crate::keys::SerialNumber;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const RANDOM_BITS: u32 = 12;
pub const TID_BITS: u32 = 20;
pub const AMOUNT_BITS: u32 = 16;
pub const CRC_BITS: u32 = 16;

const CRC_OFFSET: u32 = 0;
const AMOUNT_OFFSET: u32 = CRC_OFFSET + CRC_BITS;
const TID_OFFSET: u32 = AMOUNT_OFFSET + AMOUNT_BITS;
const RANDOM_OFFSET: u32 = TID_OFFSET + TID_BITS;

/// Largest token identifier.
pub const TID_MAX: u32 = (1 << TID_BITS) - 1;

/// 2-bit token class carried outside the ciphertext.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum TokenClass {
    /// Credit transfer (the class every vended token uses).
    #[default]
    Credit = 0,
    NonMeterSpecific = 1,
    MeterSpecific = 2,
    Reserved = 3,
}

impl TokenClass {
    pub fn from_u8(v: u8) -> TokenResult<Self> {
        match v {
            0 => Ok(Self::Credit),
            1 => Ok(Self::NonMeterSpecific),
            2 => Ok(Self::MeterSpecific),
            3 => Ok(Self::Reserved),
            _ => Err(TokenError::InvalidClassCode(v)),
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for TokenClass {
    type Error = TokenError;

    fn try_from(v: u8) -> TokenResult<Self> {
        TokenClass::from_u8(v)
    }
}

impl From<TokenClass> for u8 {
    fn from(class: TokenClass) -> u8 {
        class.bits()
    }
}

/// Token identifier (TID) binding a token to one meter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TokenIdentifier(u32);

impl TokenIdentifier {
    pub fn new(value: u32) -> TokenResult<Self> {
        if value > TID_MAX {
            return Err(TokenError::InvalidIdentifier(value));
        }
        Ok(Self(value))
    }

    /// Identifier assigned to a meter: the last seven serial digits, with
    /// leading digits dropped until the value fits in 20 bits.
    pub fn from_serial(serial: &SerialNumber) -> Self {
        let tail = &serial.as_str()[SerialNumber::LEN - 7..];
        let mut value = tail
            .bytes()
            .fold(0u32, |acc, b| acc * 10 + (b - b'0') as u32);
        let mut scale = 1_000_000;
        while value > TID_MAX {
            value %= scale;
            scale /= 10;
        }
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for TokenIdentifier {
    type Error = TokenError;

    fn try_from(v: u32) -> TokenResult<Self> {
        TokenIdentifier::new(v)
    }
}

impl From<TokenIdentifier> for u32 {
    fn from(tid: TokenIdentifier) -> u32 {
        tid.0
    }
}

impl fmt::Display for TokenIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 64-bit plaintext token block.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenBlock(u64);

impl TokenBlock {
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// Parse a block from exactly 16 hex digits.
    pub fn from_hex(s: &str) -> TokenResult<Self> {
        bits::block_from_hex(s).map(Self)
    }

    pub fn to_hex(self) -> String {
        bits::block_to_hex(self.0)
    }

    pub fn random(self) -> u16 {
        bit_field(self.0, RANDOM_OFFSET, RANDOM_BITS) as u16
    }

    pub fn identifier(self) -> TokenIdentifier {
        TokenIdentifier(bit_field(self.0, TID_OFFSET, TID_BITS) as u32)
    }

    pub fn amount_field(self) -> u16 {
        bit_field(self.0, AMOUNT_OFFSET, AMOUNT_BITS) as u16
    }

    pub fn checksum(self) -> u16 {
        bit_field(self.0, CRC_OFFSET, CRC_BITS) as u16
    }
}

impl fmt::Debug for TokenBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenBlock({})", self.to_hex())
    }
}

/// Output of the block encoder: the plaintext plus its out-of-band class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuiltBlock {
    pub block: TokenBlock,
    pub class: TokenClass,
}

/// Fields recovered from a decrypted block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenFields {
    pub identifier: TokenIdentifier,
    pub amount: Amount,
    pub random: u16,
    /// Whether the embedded CRC matches the one recomputed from the fields.
    pub crc_matches: bool,
}

/// CRC over `class ∥ random ∥ TID ∥ amount`, viewed as 7 big-endian bytes.
pub fn block_checksum(class: TokenClass, random: u16, tid: TokenIdentifier, amount_field: u16) -> u16 {
    let covered = (class.bits() as u64) << (RANDOM_BITS + TID_BITS + AMOUNT_BITS)
        | (random as u64 & mask(RANDOM_BITS)) << (TID_BITS + AMOUNT_BITS)
        | (tid.value() as u64) << AMOUNT_BITS
        | amount_field as u64;
    crc16(&covered.to_be_bytes()[1..])
}

/// Build a credit-transfer block with a fresh random field.
pub fn build_token_block(tid: TokenIdentifier, amount: Amount) -> TokenResult<BuiltBlock> {
    build_token_block_for(TokenClass::Credit, tid, amount)
}

/// Build a block of the given class with a fresh random field.
pub fn build_token_block_for(
    class: TokenClass,
    tid: TokenIdentifier,
    amount: Amount,
) -> TokenResult<BuiltBlock> {
    let random = rand::thread_rng().gen_range(0..=mask(RANDOM_BITS)) as u16;
    assemble(class, random, tid, amount)
}

/// Assemble a block from explicit fields. Only the low 12 bits of `random`
/// are used. The CRC is computed last, over the preceding fields.
pub fn assemble(
    class: TokenClass,
    random: u16,
    tid: TokenIdentifier,
    amount: Amount,
) -> TokenResult<BuiltBlock> {
    let random = random & mask(RANDOM_BITS) as u16;
    let amount_field = amount::encode(amount)?;
    let crc = block_checksum(class, random, tid, amount_field);

    let bits = (random as u64) << RANDOM_OFFSET
        | (tid.value() as u64) << TID_OFFSET
        | (amount_field as u64) << AMOUNT_OFFSET
        | (crc as u64) << CRC_OFFSET;

    Ok(BuiltBlock {
        block: TokenBlock(bits),
        class,
    })
}

/// Slice a decrypted block into its fields and check its CRC.
///
/// Never fails: a CRC mismatch is reported through
/// [`TokenFields::crc_matches`] for the caller to act on.
pub fn extract_fields(block: TokenBlock, class: TokenClass) -> TokenFields {
    let random = block.random();
    let identifier = block.identifier();
    let amount_field = block.amount_field();
    let expected = block_checksum(class, random, identifier, amount_field);

    TokenFields {
        identifier,
        amount: amount::decode(amount_field),
        random,
        crc_matches: expected == block.checksum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tid(v: u32) -> TokenIdentifier {
        TokenIdentifier::new(v).unwrap()
    }

    #[test]
    fn test_layout_positions() {
        let built = assemble(TokenClass::Credit, 0xABC, tid(0xDEF01), Amount::from_tenths(0x2345).unwrap())
            .unwrap();
        let bits = built.block.bits();
        assert_eq!(bits >> 52, 0xABC);
        assert_eq!((bits >> 32) & 0xF_FFFF, 0xDEF01);
        assert_eq!((bits >> 16) & 0xFFFF, 0x2345);
        assert_eq!(bits & 0xFFFF, built.block.checksum() as u64);
        assert_eq!(built.class, TokenClass::Credit);
    }

    #[test]
    fn test_checksum_covers_zero_extended_fields() {
        let built = assemble(TokenClass::Credit, 4, tid(123133), Amount::from_tenths(6925).unwrap())
            .unwrap();
        // 0 ∥ 000000000100 ∥ TID ∥ 0x1B0D as 50 bits, left-padded to 7 bytes.
        let covered: u64 = (4u64 << 36) | (123133u64 << 16) | 6925;
        assert_eq!(built.block.checksum(), crc16(&covered.to_be_bytes()[1..]));
    }

    #[test]
    fn test_class_participates_in_checksum() {
        let amount = Amount::from_tenths(100).unwrap();
        let credit = assemble(TokenClass::Credit, 7, tid(42), amount).unwrap();
        let mgmt = assemble(TokenClass::MeterSpecific, 7, tid(42), amount).unwrap();
        assert_ne!(credit.block.checksum(), mgmt.block.checksum());

        assert!(extract_fields(credit.block, TokenClass::Credit).crc_matches);
        assert!(!extract_fields(credit.block, TokenClass::MeterSpecific).crc_matches);
    }

    #[test]
    fn test_extract_fields_roundtrip() {
        let amount = Amount::MAX;
        let built = assemble(TokenClass::Credit, 0xFFF, tid(TID_MAX), amount).unwrap();
        let fields = extract_fields(built.block, built.class);
        assert_eq!(fields.identifier.value(), TID_MAX);
        assert_eq!(fields.amount, amount);
        assert_eq!(fields.random, 0xFFF);
        assert!(fields.crc_matches);
    }

    #[test]
    fn test_random_field_is_masked() {
        let built = assemble(TokenClass::Credit, 0xF123, tid(1), Amount::ZERO).unwrap();
        assert_eq!(built.block.random(), 0x123);
    }

    #[test]
    fn test_unrepresentable_amount_is_rejected() {
        let amount = Amount::from_tenths(16_385).unwrap();
        assert!(matches!(
            build_token_block(tid(1), amount),
            Err(TokenError::AmountNotRepresentable { .. })
        ));
    }

    #[test]
    fn test_identifier_bounds() {
        assert!(TokenIdentifier::new(TID_MAX).is_ok());
        assert_eq!(
            TokenIdentifier::new(TID_MAX + 1),
            Err(TokenError::InvalidIdentifier(TID_MAX + 1))
        );
    }

    #[test]
    fn test_identifier_from_serial() {
        let serial: SerialNumber = "45623123133".parse().unwrap();
        assert_eq!(TokenIdentifier::from_serial(&serial).value(), 123133);

        let serial: SerialNumber = "00000001234".parse().unwrap();
        assert_eq!(TokenIdentifier::from_serial(&serial).value(), 1234);

        let serial: SerialNumber = "99991048575".parse().unwrap();
        assert_eq!(TokenIdentifier::from_serial(&serial).value(), 1_048_575);

        let serial: SerialNumber = "99991048576".parse().unwrap();
        assert_eq!(TokenIdentifier::from_serial(&serial).value(), 48_576);
    }

    #[test]
    fn test_class_from_u8() {
        assert_eq!(TokenClass::from_u8(2).unwrap(), TokenClass::MeterSpecific);
        assert_eq!(TokenClass::from_u8(4), Err(TokenError::InvalidClassCode(4)));
    }

    #[test]
    fn test_block_hex() {
        let block = TokenBlock::from_hex("3426C26E339A4DDE").unwrap();
        assert_eq!(block.bits(), 0x3426_C26E_339A_4DDE);
        assert_eq!(block.to_hex(), "3426C26E339A4DDE");
        assert!(TokenBlock::from_hex("3426C26E").is_err());
    }

    proptest! {
        #[test]
        fn prop_crc_detects_single_bit_flips(
            random in 0u16..4096,
            id in 0u32..=TID_MAX,
            field in any::<u16>(),
            flip in 16u32..64,
        ) {
            let amount = amount::decode(field);
            let built = assemble(TokenClass::Credit, random, tid(id), amount).unwrap();
            let tampered = TokenBlock::from_bits(built.block.bits() ^ (1u64 << flip));
            prop_assert!(!extract_fields(tampered, built.class).crc_matches);
        }
    }
}

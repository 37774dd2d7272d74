//! Meter serial numbers and key derivation.
//!
//! - `VendingKey`: per-meter master key built from the serial number
//! - `ControlParams`: public key-derivation parameters
//! - `DecoderKey`: working key derived from the two, used for token crypto
//!
//! The vending key is a reversible encoding of the serial number, not a
//! one-way derivation. Anyone who knows a meter's serial number can rebuild
//! it; it exists to stay interoperable with existing key files.

use crate::bits::{self, bcd_block};
use crate::cipher;
use crate::error::{TokenError, TokenResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 11-digit meter serial number.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SerialNumber(String);

impl SerialNumber {
    pub const LEN: usize = 11;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SerialNumber {
    type Err = TokenError;

    fn from_str(s: &str) -> TokenResult<Self> {
        if s.len() != Self::LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::InvalidSerialNumber(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for SerialNumber {
    type Error = TokenError;

    fn try_from(s: String) -> TokenResult<Self> {
        s.parse()
    }
}

impl From<SerialNumber> for String {
    fn from(serial: SerialNumber) -> String {
        serial.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored width of vending key material.
pub const VENDING_KEY_LEN: usize = 16;

/// Per-meter master key.
///
/// Holds the serial number right-padded with ASCII `'0'` to 16 bytes; the
/// DES key is the first 8 of them.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct VendingKey {
    material: [u8; VENDING_KEY_LEN],
}

impl VendingKey {
    /// Build the vending key for a meter.
    pub fn derive(serial: &SerialNumber) -> Self {
        let mut material = [b'0'; VENDING_KEY_LEN];
        material[..SerialNumber::LEN].copy_from_slice(serial.as_str().as_bytes());
        Self { material }
    }

    /// Encode the key material for storage.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.material)
    }

    /// Decode stored key material.
    pub fn from_base64(encoded: &str) -> TokenResult<Self> {
        let mut decoded = BASE64.decode(encoded.trim())?;
        let result = <[u8; VENDING_KEY_LEN]>::try_from(decoded.as_slice())
            .map(|material| Self { material })
            .map_err(|_| TokenError::InvalidKeyLength {
                expected: VENDING_KEY_LEN,
                actual: decoded.len(),
            });
        decoded.zeroize();
        result
    }

    /// The 64 bits the cipher consumes.
    pub fn des_key(&self) -> u64 {
        let mut key = [0u8; 8];
        key.copy_from_slice(&self.material[..8]);
        u64::from_be_bytes(key)
    }
}

impl fmt::Debug for VendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VendingKey(<redacted>)")
    }
}

/// Derive the vending key for a serial number.
pub fn derive_vending_key(serial: &SerialNumber) -> VendingKey {
    VendingKey::derive(serial)
}

/// Issuer prefix used with an 11-digit decoder reference number.
pub const IIN_SHORT_DRN: &str = "600727";

/// Issuer prefix used with a 13-digit decoder reference number.
pub const IIN_LONG_DRN: &str = "0000";

/// Public parameters mixed into the decoder key.
///
/// The control block is `KT(1) ∥ SGC(6) ∥ TI(2) ∥ KRN(1) ∥ FFFFFF`, read as
/// 16 hex digits with the decimal fields as BCD nibbles.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlParams {
    pub key_type: u8,
    pub supply_group_code: u32,
    pub tariff_index: u8,
    pub key_revision_number: u8,
    /// 11 or 13 decimal digits.
    pub decoder_reference_number: String,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            key_type: 3,
            supply_group_code: 560983,
            tariff_index: 1,
            key_revision_number: 1,
            decoder_reference_number: "56728389217".to_string(),
        }
    }
}

fn check_digit_range(name: &'static str, value: u32, max: u32) -> TokenResult<()> {
    if value > max {
        return Err(TokenError::InvalidControlParameter {
            name,
            reason: format!("{} does not fit in {} digits", value, max.to_string().len()),
        });
    }
    Ok(())
}

impl ControlParams {
    pub fn validate(&self) -> TokenResult<()> {
        check_digit_range("key_type", self.key_type as u32, 9)?;
        check_digit_range("supply_group_code", self.supply_group_code, 999_999)?;
        check_digit_range("tariff_index", self.tariff_index as u32, 99)?;
        check_digit_range("key_revision_number", self.key_revision_number as u32, 9)?;

        let drn = &self.decoder_reference_number;
        if !matches!(drn.len(), 11 | 13) || !drn.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::InvalidControlParameter {
                name: "decoder_reference_number",
                reason: format!("expected 11 or 13 digits, got {drn:?}"),
            });
        }
        Ok(())
    }

    pub fn control_block(&self) -> TokenResult<u64> {
        self.validate()?;
        let digits = format!(
            "{}{:06}{:02}{}",
            self.key_type, self.supply_group_code, self.tariff_index, self.key_revision_number
        );
        bits::block_from_hex(&format!("{digits}FFFFFF"))
    }

    /// The PAN block: the rightmost 16 digits of `IIN ∥ DRN`.
    pub fn pan_block(&self) -> TokenResult<u64> {
        self.validate()?;
        let drn = &self.decoder_reference_number;
        let iin = if drn.len() == 11 { IIN_SHORT_DRN } else { IIN_LONG_DRN };
        let pan = format!("{iin}{drn}");
        bcd_block(&pan[pan.len() - 16..])
    }
}

/// Working key a meter uses to decrypt its tokens.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DecoderKey(u64);

impl DecoderKey {
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Parse a key from exactly 16 hex digits.
    pub fn from_hex(s: &str) -> TokenResult<Self> {
        bits::block_from_hex(s).map(Self)
    }

    pub fn to_hex(&self) -> String {
        bits::block_to_hex(self.0)
    }
}

impl fmt::Debug for DecoderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecoderKey(<redacted>)")
    }
}

/// Derive the decoder key for a vending key and control parameters.
///
/// ```text
/// X = PanBlock ^ ControlBlock
/// Y = DES(X, VendingKey)
/// DecoderKey = VendingKey ^ X ^ Y
/// ```
///
/// Any difference in a control parameter silently yields a different key.
pub fn derive_decoder_key(vending_key: &VendingKey, params: &ControlParams) -> TokenResult<DecoderKey> {
    let x = params.pan_block()? ^ params.control_block()?;
    let vk = vending_key.des_key();
    let y = cipher::encrypt_block(x, vk);

    debug!(
        key_type = params.key_type,
        supply_group_code = params.supply_group_code,
        key_revision_number = params.key_revision_number,
        "derived decoder key"
    );
    Ok(DecoderKey(vk ^ x ^ y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn serial() -> SerialNumber {
        "45623123133".parse().unwrap()
    }

    #[test]
    fn test_serial_validation() {
        assert!("45623123133".parse::<SerialNumber>().is_ok());
        assert!("4562312313".parse::<SerialNumber>().is_err());
        assert!("456231231334".parse::<SerialNumber>().is_err());
        assert!("4562312313a".parse::<SerialNumber>().is_err());
        assert!("4562312 133".parse::<SerialNumber>().is_err());
    }

    #[test]
    fn test_vending_key_is_padded_serial() {
        let vk = derive_vending_key(&serial());
        assert_eq!(vk.des_key(), u64::from_be_bytes(*b"45623123"));
        assert_eq!(vk.to_base64(), BASE64.encode(b"4562312313300000"));
    }

    #[test]
    fn test_vending_key_base64_roundtrip() {
        let vk = derive_vending_key(&serial());
        let restored = VendingKey::from_base64(&vk.to_base64()).unwrap();
        assert_eq!(restored, vk);

        let short = BASE64.encode(b"45623123");
        assert_eq!(
            VendingKey::from_base64(&short),
            Err(TokenError::InvalidKeyLength { expected: 16, actual: 8 })
        );
        assert!(matches!(
            VendingKey::from_base64("not base64!"),
            Err(TokenError::InvalidKeyEncoding(_))
        ));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let vk = derive_vending_key(&serial());
        let dk = derive_decoder_key(&vk, &ControlParams::default()).unwrap();
        assert_eq!(format!("{:?}", vk), "VendingKey(<redacted>)");
        assert_eq!(format!("{:?}", dk), "DecoderKey(<redacted>)");
    }

    #[test]
    fn test_control_block_layout() {
        let params = ControlParams::default();
        assert_eq!(params.control_block().unwrap(), 0x3560_9830_11FF_FFFF);
    }

    #[test]
    fn test_pan_block_prefixes() {
        let params = ControlParams::default();
        assert_eq!(params.pan_block().unwrap(), 0x0072_7567_2838_9217);

        let long = ControlParams {
            decoder_reference_number: "1234567890123".to_string(),
            ..ControlParams::default()
        };
        assert_eq!(long.pan_block().unwrap(), 0x0001_2345_6789_0123);
    }

    #[test]
    fn test_invalid_control_params() {
        let bad_drn = ControlParams {
            decoder_reference_number: "123456789012".to_string(),
            ..ControlParams::default()
        };
        assert!(matches!(
            bad_drn.validate(),
            Err(TokenError::InvalidControlParameter { name: "decoder_reference_number", .. })
        ));

        let bad_sgc = ControlParams {
            supply_group_code: 1_000_000,
            ..ControlParams::default()
        };
        assert!(matches!(
            bad_sgc.control_block(),
            Err(TokenError::InvalidControlParameter { name: "supply_group_code", .. })
        ));

        let bad_kt = ControlParams {
            key_type: 10,
            ..ControlParams::default()
        };
        assert!(derive_decoder_key(&derive_vending_key(&serial()), &bad_kt).is_err());
    }

    #[test]
    fn test_decoder_key_formula() {
        let vk = derive_vending_key(&serial());
        let params = ControlParams::default();
        let x = 0x0072_7567_2838_9217u64 ^ 0x3560_9830_11FF_FFFF;
        let expected = vk.des_key() ^ x ^ cipher::encrypt_block(x, vk.des_key());
        assert_eq!(derive_decoder_key(&vk, &params).unwrap().bits(), expected);
    }

    #[test]
    fn test_decoder_key_deterministic() {
        let params = ControlParams::default();
        let a = derive_decoder_key(&derive_vending_key(&serial()), &params).unwrap();
        let b = derive_decoder_key(&derive_vending_key(&serial()), &params).unwrap();
        assert_eq!(a, b);
        assert_eq!(DecoderKey::from_hex(&a.to_hex()).unwrap(), a);
    }

    #[test]
    fn test_decoder_key_depends_on_serial() {
        let params = ControlParams::default();
        let other: SerialNumber = "12345678901".parse().unwrap();
        let a = derive_decoder_key(&derive_vending_key(&serial()), &params).unwrap();
        let b = derive_decoder_key(&derive_vending_key(&other), &params).unwrap();
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_each_control_parameter_changes_key(
            field in 0usize..5,
            kt in 0u8..=9,
            sgc in 0u32..=999_999,
            ti in 0u8..=99,
            krn in 0u8..=9,
            drn in "[0-9]{11}",
        ) {
            let vk = derive_vending_key(&serial());
            let base = ControlParams::default();
            let mut changed = base.clone();
            match field {
                0 => changed.key_type = kt,
                1 => changed.supply_group_code = sgc,
                2 => changed.tariff_index = ti,
                3 => changed.key_revision_number = krn,
                _ => changed.decoder_reference_number = drn,
            }
            prop_assume!(changed != base);
            let a = derive_decoder_key(&vk, &base).unwrap();
            let b = derive_decoder_key(&vk, &changed).unwrap();
            prop_assert_ne!(a, b);
        }
    }
}

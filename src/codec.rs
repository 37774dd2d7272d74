//! Token encryptor and decryptor.
//!
//! Issuance: plaintext block → DES → class-bit insertion → 20-digit number.
//! Redemption runs the same steps backwards. Only the class code can be read
//! from a token number without the decoder key.

use crate::bits::group_digits;
use crate::block::{extract_fields, TokenBlock, TokenClass, TokenFields};
use crate::cipher;
use crate::error::{TokenError, TokenResult};
use crate::keys::DecoderKey;
use crate::transposition::{self, TOKEN_BITS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimal digits in a rendered token number.
pub const TOKEN_DIGITS: usize = 20;

/// Digits per dash-separated display group.
pub const DIGIT_GROUP: usize = 4;

/// 66-bit token number (class code hidden inside the transposed ciphertext).
///
/// Displays as `1111-2222-3333-4444-5555`; parses from the grouped form or
/// the bare 20 digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenNumber(u128);

impl TokenNumber {
    /// Wrap a transposed 66-bit value.
    pub fn from_transposed(value: u128) -> TokenResult<Self> {
        if value >> TOKEN_BITS != 0 {
            return Err(TokenError::TransportPadding);
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u128 {
        self.0
    }

    /// Class code, readable without decryption.
    pub fn class(self) -> TokenClass {
        transposition::class_bits(self.0)
    }

    /// The 20 decimal digits, zero-padded.
    pub fn digits(self) -> String {
        format!("{:0width$}", self.0, width = TOKEN_DIGITS)
    }

    /// Digits in dash-separated groups of four.
    pub fn grouped(self) -> String {
        group_digits(&self.digits(), DIGIT_GROUP)
    }

    /// Hex-aligned 68-bit transport form (17 hex digits).
    pub fn to_transport_hex(self) -> String {
        format!("{:017X}", self.0)
    }
}

impl fmt::Display for TokenNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.grouped())
    }
}

impl fmt::Debug for TokenNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenNumber({})", self.grouped())
    }
}

impl FromStr for TokenNumber {
    type Err = TokenError;

    fn from_str(s: &str) -> TokenResult<Self> {
        let digits: String = s.trim().chars().filter(|&c| c != '-').collect();
        if digits.len() != TOKEN_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::InvalidTokenNumber(format!(
                "expected {} digits, got {:?}",
                TOKEN_DIGITS, s
            )));
        }
        let value: u128 = digits
            .parse()
            .map_err(|_| TokenError::InvalidTokenNumber(s.to_string()))?;
        TokenNumber::from_transposed(value)
    }
}

impl TryFrom<String> for TokenNumber {
    type Error = TokenError;

    fn try_from(s: String) -> TokenResult<Self> {
        s.parse()
    }
}

impl From<TokenNumber> for String {
    fn from(token: TokenNumber) -> String {
        token.grouped()
    }
}

/// Encrypt a plaintext block and hide its class code.
pub fn encrypt_token(block: TokenBlock, class: TokenClass, key: &DecoderKey) -> TokenNumber {
    let ciphertext = cipher::encrypt_block(block.bits(), key.bits());
    TokenNumber(transposition::insert_class_bits(ciphertext, class))
}

/// Recover the plaintext block from a token number.
pub fn decrypt_token(token: &TokenNumber, key: &DecoderKey) -> TokenResult<TokenBlock> {
    let (ciphertext, _class) = transposition::remove_class_bits(token.value())?;
    Ok(TokenBlock::from_bits(cipher::decrypt_block(ciphertext, key.bits())))
}

/// Decrypt a token and extract its fields, using the class code carried in
/// the token number for the CRC check.
pub fn open_token(token: &TokenNumber, key: &DecoderKey) -> TokenResult<TokenFields> {
    let block = decrypt_token(token, key)?;
    Ok(extract_fields(block, token.class()))
}

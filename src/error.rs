//! Error types for the token codec and the vending service built on it.

use thiserror::Error;

/// Result type for codec and vending operations
pub type TokenResult<T> = Result<T, TokenError>;

/// Errors produced by the token codec, key derivation and vending service.
///
/// Precondition failures (bad widths, malformed input) come out of the codec
/// itself. Integrity and replay rejections are only raised by
/// [`crate::vending::TokenService`]; the codec reports checksum agreement as
/// a plain field on [`crate::block::TokenFields`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Meter serial number is not exactly 11 ASCII digits.
    #[error("serial number must be 11 digits, got {0:?}")]
    InvalidSerialNumber(String),

    /// Token number string is not a 20-digit (optionally dashed) decimal.
    #[error("invalid token number: {0}")]
    InvalidTokenNumber(String),

    /// Token identifier does not fit the 20-bit TID field.
    #[error("token identifier {0} exceeds the 20-bit field")]
    InvalidIdentifier(u32),

    /// Amount is negative, not finite, or above the largest encodable value.
    #[error("amount out of range: {0}")]
    AmountOutOfRange(String),

    /// Amount lies in range but has no exact exponent/mantissa encoding.
    #[error("amount of {tenths} tenths has no exact encoding under exponent {exponent}")]
    AmountNotRepresentable {
        /// Amount in tenths of a unit.
        tenths: u32,
        /// Exponent selected for the amount.
        exponent: u8,
    },

    /// Class code does not fit in 2 bits.
    #[error("token class {0} does not fit in 2 bits")]
    InvalidClassCode(u8),

    /// A key-derivation control parameter has the wrong width or digits.
    #[error("invalid control parameter {name}: {reason}")]
    InvalidControlParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Key or block material is not the expected number of bytes.
    #[error("expected {expected} bytes of key material, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes.
        expected: usize,
        /// Supplied length in bytes.
        actual: usize,
    },

    /// Hex string is malformed or not exactly 64 bits wide.
    #[error("invalid hex block: {0}")]
    InvalidHex(String),

    /// Persisted vending key could not be decoded.
    #[error("invalid vending key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// The hex-rounded 68-bit transport form carried non-zero padding bits.
    #[error("token number exceeds 66 bits: transport padding bits are set")]
    TransportPadding,

    /// Recomputed CRC disagrees with the embedded checksum.
    #[error("token checksum mismatch (wrong key or tampered token)")]
    ChecksumMismatch,

    /// Extracted TID does not belong to this meter.
    #[error("token identifier mismatch: expected {expected}, got {actual}")]
    IdentifierMismatch {
        /// TID bound to the meter.
        expected: u32,
        /// TID found in the token.
        actual: u32,
    },

    /// Token number already recorded for this meter.
    #[error("token already used for meter {0}")]
    TokenAlreadyUsed(String),

    /// Issuance loop hit its retry cap without producing a fresh token.
    #[error("no fresh token after {attempts} issue attempts")]
    IssueAttemptsExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Ledger backend failure.
    #[error("ledger storage error: {0}")]
    Storage(String),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for TokenError {
    fn from(e: std::io::Error) -> Self {
        TokenError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for TokenError {
    fn from(e: serde_json::Error) -> Self {
        TokenError::Storage(e.to_string())
    }
}

impl From<base64::DecodeError> for TokenError {
    fn from(e: base64::DecodeError) -> Self {
        TokenError::InvalidKeyEncoding(e.to_string())
    }
}

impl From<hex::FromHexError> for TokenError {
    fn from(e: hex::FromHexError) -> Self {
        TokenError::InvalidHex(e.to_string())
    }
}

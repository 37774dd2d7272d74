//! STS Token Codec Library
//!
//! This library encodes and decodes 20-digit prepaid-meter tokens in the
//! style of the Standard Transfer Specification. It supports:
//!
//! - Per-meter vending keys and decoder-key derivation from control parameters
//! - Exponent/mantissa amount encoding with a CRC-16 protected 64-bit block
//! - DES encryption and class-bit transposition into a 66-bit token number
//! - A used-token ledger and a vending service with double-spend rejection
//!
//! ## Example
//!
//! ```rust,no_run
//! use sts_token_codec::{
//!     derive_decoder_key, derive_vending_key, encrypt_token, open_token,
//!     build_token_block, Amount, ControlParams, SerialNumber, TokenIdentifier,
//! };
//!
//! let serial: SerialNumber = "45623123133".parse().unwrap();
//! let key = derive_decoder_key(&derive_vending_key(&serial), &ControlParams::default()).unwrap();
//!
//! let amount: Amount = "692.5".parse().unwrap();
//! let built = build_token_block(TokenIdentifier::from_serial(&serial), amount).unwrap();
//! let token = encrypt_token(built.block, built.class, &key);
//! println!("token: {}", token);
//!
//! let fields = open_token(&token, &key).unwrap();
//! assert!(fields.crc_matches);
//! ```

pub mod amount;
mod bits;
pub mod block;
pub mod cipher;
pub mod codec;
pub mod config;
pub mod crc;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod transposition;
pub mod vending;

// Re-export key types
pub use amount::Amount;

pub use block::{
    build_token_block,
    build_token_block_for,
    extract_fields,
    BuiltBlock,
    TokenBlock,
    TokenClass,
    TokenFields,
    TokenIdentifier,
};

pub use codec::{decrypt_token, encrypt_token, open_token, TokenNumber};

pub use config::VendingConfig;

pub use error::{TokenError, TokenResult};

pub use keys::{
    derive_decoder_key,
    derive_vending_key,
    ControlParams,
    DecoderKey,
    SerialNumber,
    VendingKey,
};

pub use ledger::{InMemoryLedger, JsonFileLedger, MeterRecord, TokenLedger};

pub use vending::{IssuedToken, Redemption, TokenService};

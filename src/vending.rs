//! Token vending and redemption service.
//!
//! This module drives the codec on behalf of a caller:
//! - Issuing tokens for a meter with a bounded generate-check-retry loop
//! - Redeeming tokens on the meter side (integrity, identity and replay checks)
//! - Reporting the credit balance a meter has accumulated
//!
//! Decoder keys are re-derived for every call and dropped when it returns.

use crate::amount::Amount;
use crate::block::{build_token_block_for, TokenClass, TokenIdentifier};
use crate::codec::{encrypt_token, open_token, TokenNumber};
use crate::config::VendingConfig;
use crate::error::{TokenError, TokenResult};
use crate::keys::{derive_decoder_key, derive_vending_key, DecoderKey, SerialNumber};
use crate::ledger::TokenLedger;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A freshly issued token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub serial_number: SerialNumber,
    pub token: TokenNumber,
    pub identifier: TokenIdentifier,
    pub amount: Amount,
    /// Attempts the issuance loop needed.
    pub attempts: u32,
}

/// Outcome of applying a token to a meter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub serial_number: SerialNumber,
    pub token: TokenNumber,
    pub class: TokenClass,
    pub amount: Amount,
    /// Meter balance after this token, in tenths.
    pub credit_balance: u64,
}

/// Vending service over a pair of ledgers.
pub struct TokenService<L: TokenLedger> {
    config: VendingConfig,

    /// Tokens handed out, per meter (avoids re-issuing a token number)
    issued: L,

    /// Tokens applied to meters, with their accumulated credit
    applied: L,
}

impl<L: TokenLedger> TokenService<L> {
    pub fn new(config: VendingConfig, issued: L, applied: L) -> TokenResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            issued,
            applied,
        })
    }

    pub fn config(&self) -> &VendingConfig {
        &self.config
    }

    pub fn issued_ledger(&self) -> &L {
        &self.issued
    }

    pub fn applied_ledger(&self) -> &L {
        &self.applied
    }

    /// Derive the decoder key for a meter under the configured parameters.
    pub fn decoder_key(&self, serial: &SerialNumber) -> TokenResult<DecoderKey> {
        derive_decoder_key(&derive_vending_key(serial), &self.config.control)
    }

    /// Issue a token crediting `amount` to the meter.
    ///
    /// Regenerates the random field until the token round-trips to the
    /// expected identifier and amount and its number has not been issued to
    /// this meter before, giving up after `max_issue_attempts`.
    pub fn issue(&mut self, serial: &SerialNumber, amount: Amount) -> TokenResult<IssuedToken> {
        let key = self.decoder_key(serial)?;
        let identifier = TokenIdentifier::from_serial(serial);
        let max_attempts = self.config.max_issue_attempts;

        for attempt in 1..=max_attempts {
            let built = build_token_block_for(self.config.token_class, identifier, amount)?;
            let token = encrypt_token(built.block, built.class, &key);

            let fields = open_token(&token, &key)?;
            if !fields.crc_matches || fields.identifier != identifier || fields.amount != amount {
                debug!(serial = %serial, attempt, "round trip mismatch, regenerating");
                continue;
            }

            if self.issued.is_token_used(serial, &token)? {
                debug!(serial = %serial, attempt, "token number already issued, regenerating");
                continue;
            }

            self.issued
                .record_token(serial, token, amount.tenths() as u64)?;
            info!(serial = %serial, amount = %amount, attempts = attempt, "token issued");

            return Ok(IssuedToken {
                serial_number: serial.clone(),
                token,
                identifier,
                amount,
                attempts: attempt,
            });
        }

        warn!(serial = %serial, attempts = max_attempts, "issue attempts exhausted");
        Err(TokenError::IssueAttemptsExhausted {
            attempts: max_attempts,
        })
    }

    /// Apply a token to a meter.
    ///
    /// Rejects tokens whose checksum fails (wrong meter key or mistyped
    /// number), whose identifier belongs to another meter, or that were
    /// already applied. Only credit-transfer tokens add to the balance.
    pub fn redeem(&mut self, serial: &SerialNumber, token: &TokenNumber) -> TokenResult<Redemption> {
        let key = self.decoder_key(serial)?;
        let fields = open_token(token, &key)?;

        if !fields.crc_matches {
            warn!(serial = %serial, "token rejected: checksum mismatch");
            return Err(TokenError::ChecksumMismatch);
        }

        let expected = TokenIdentifier::from_serial(serial);
        if fields.identifier != expected {
            warn!(serial = %serial, "token rejected: identifier mismatch");
            return Err(TokenError::IdentifierMismatch {
                expected: expected.value(),
                actual: fields.identifier.value(),
            });
        }

        if self.applied.is_token_used(serial, token)? {
            warn!(serial = %serial, "token rejected: already used");
            return Err(TokenError::TokenAlreadyUsed(serial.to_string()));
        }

        let class = token.class();
        let credit = match class {
            TokenClass::Credit => fields.amount.tenths() as u64,
            _ => 0,
        };
        let record = self.applied.record_token(serial, *token, credit)?;
        info!(serial = %serial, amount = %fields.amount, ?class, "token applied");

        Ok(Redemption {
            serial_number: serial.clone(),
            token: *token,
            class,
            amount: fields.amount,
            credit_balance: record.credit_balance,
        })
    }

    /// Credit accumulated on a meter, in tenths.
    pub fn balance(&self, serial: &SerialNumber) -> TokenResult<u64> {
        self.applied.credit_balance(serial)
    }
}

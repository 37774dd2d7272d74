//! Used-token ledger.
//!
//! One record per meter serial number: the token numbers already seen and the
//! credit accumulated from them. The vending side keeps one ledger of issued
//! tokens, the meter side one of applied tokens.
//!
//! Backends take `&mut self` for writes, so a single ledger handle serializes
//! its own read-modify-write cycles. Sharing one JSON file between processes
//! is not supported.

use crate::codec::TokenNumber;
use crate::error::{TokenError, TokenResult};
use crate::keys::SerialNumber;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ledger entry for one meter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterRecord {
    pub serial_number: SerialNumber,
    pub tokens_used: Vec<TokenNumber>,
    /// Accumulated credit, in tenths of a unit.
    pub credit_balance: u64,
}

impl MeterRecord {
    pub fn new(serial_number: SerialNumber) -> Self {
        Self {
            serial_number,
            tokens_used: Vec::new(),
            credit_balance: 0,
        }
    }

    pub fn contains(&self, token: &TokenNumber) -> bool {
        self.tokens_used.contains(token)
    }

    /// Append a token and add its credit.
    pub fn mark_used(&mut self, token: TokenNumber, credit_tenths: u64) -> TokenResult<()> {
        if self.contains(&token) {
            return Err(TokenError::TokenAlreadyUsed(self.serial_number.to_string()));
        }
        self.credit_balance = self
            .credit_balance
            .checked_add(credit_tenths)
            .ok_or_else(|| TokenError::Storage("credit balance overflow".to_string()))?;
        self.tokens_used.push(token);
        Ok(())
    }
}

/// Storage for used tokens, keyed by meter serial number.
pub trait TokenLedger {
    /// Fetch the record for a meter, if any.
    fn load(&self, serial: &SerialNumber) -> TokenResult<Option<MeterRecord>>;

    /// Record `token` as used for `serial`, crediting `credit_tenths`.
    ///
    /// Fails with [`TokenError::TokenAlreadyUsed`] if the token is already
    /// recorded for that meter.
    fn record_token(
        &mut self,
        serial: &SerialNumber,
        token: TokenNumber,
        credit_tenths: u64,
    ) -> TokenResult<MeterRecord>;

    fn is_token_used(&self, serial: &SerialNumber, token: &TokenNumber) -> TokenResult<bool> {
        Ok(self
            .load(serial)?
            .map(|record| record.contains(token))
            .unwrap_or(false))
    }

    /// Credit balance in tenths; zero for an unknown meter.
    fn credit_balance(&self, serial: &SerialNumber) -> TokenResult<u64> {
        Ok(self
            .load(serial)?
            .map(|record| record.credit_balance)
            .unwrap_or(0))
    }
}

/// Ledger held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    records: HashMap<SerialNumber, MeterRecord>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TokenLedger for InMemoryLedger {
    fn load(&self, serial: &SerialNumber) -> TokenResult<Option<MeterRecord>> {
        Ok(self.records.get(serial).cloned())
    }

    fn record_token(
        &mut self,
        serial: &SerialNumber,
        token: TokenNumber,
        credit_tenths: u64,
    ) -> TokenResult<MeterRecord> {
        let record = self
            .records
            .entry(serial.clone())
            .or_insert_with(|| MeterRecord::new(serial.clone()));
        record.mark_used(token, credit_tenths)?;
        Ok(record.clone())
    }
}

/// Ledger persisted as a JSON array of [`MeterRecord`]s.
///
/// Each write rewrites the whole file through a temporary sibling and a
/// rename, so a crash leaves either the old or the new contents.
#[derive(Clone, Debug)]
pub struct JsonFileLedger {
    path: PathBuf,
}

impl JsonFileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> TokenResult<Vec<MeterRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = std::fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&json)?)
    }

    fn write_all(&self, records: &[MeterRecord]) -> TokenResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TokenLedger for JsonFileLedger {
    fn load(&self, serial: &SerialNumber) -> TokenResult<Option<MeterRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .find(|record| &record.serial_number == serial))
    }

    fn record_token(
        &mut self,
        serial: &SerialNumber,
        token: TokenNumber,
        credit_tenths: u64,
    ) -> TokenResult<MeterRecord> {
        let mut records = self.read_all()?;
        let index = match records.iter().position(|r| &r.serial_number == serial) {
            Some(index) => index,
            None => {
                records.push(MeterRecord::new(serial.clone()));
                records.len() - 1
            }
        };
        records[index].mark_used(token, credit_tenths)?;
        let updated = records[index].clone();
        self.write_all(&records)?;

        debug!(
            path = %self.path.display(),
            serial = %serial,
            tokens = updated.tokens_used.len(),
            "ledger updated"
        );
        Ok(updated)
    }
}

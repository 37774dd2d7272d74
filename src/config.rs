//! Vending configuration.
//!
//! Loaded from JSON; every field has a default matching the reference
//! deployment, so a partial file only overrides what it names.

use crate::block::TokenClass;
use crate::error::{TokenError, TokenResult};
use crate::keys::ControlParams;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default cap on the issuance generate-check-retry loop.
pub const DEFAULT_MAX_ISSUE_ATTEMPTS: u32 = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendingConfig {
    /// Control parameters used for every decoder-key derivation.
    pub control: ControlParams,
    /// Class stamped on issued tokens.
    pub token_class: TokenClass,
    /// Attempts before issuance gives up on finding a fresh token number.
    pub max_issue_attempts: u32,
}

impl Default for VendingConfig {
    fn default() -> Self {
        Self {
            control: ControlParams::default(),
            token_class: TokenClass::Credit,
            max_issue_attempts: DEFAULT_MAX_ISSUE_ATTEMPTS,
        }
    }
}

impl VendingConfig {
    pub fn from_json_str(json: &str) -> TokenResult<Self> {
        let config: VendingConfig =
            serde_json::from_str(json).map_err(|e| TokenError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> TokenResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| TokenError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> TokenResult<()> {
        if self.max_issue_attempts == 0 {
            return Err(TokenError::Config(
                "max_issue_attempts must be at least 1".to_string(),
            ));
        }
        self.control.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_reference_deployment() {
        let config = VendingConfig::default();
        assert_eq!(config.control.key_type, 3);
        assert_eq!(config.control.supply_group_code, 560983);
        assert_eq!(config.control.tariff_index, 1);
        assert_eq!(config.control.key_revision_number, 1);
        assert_eq!(config.control.decoder_reference_number, "56728389217");
        assert_eq!(config.token_class, TokenClass::Credit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = VendingConfig::from_json_str(r#"{"max_issue_attempts": 8}"#).unwrap();
        assert_eq!(config.max_issue_attempts, 8);
        assert_eq!(config.control, ControlParams::default());

        let config = VendingConfig::from_json_str(
            r#"{"control": {"key_type": 2, "supply_group_code": 123456, "tariff_index": 7,
                "key_revision_number": 2, "decoder_reference_number": "1234567890123"}}"#,
        )
        .unwrap();
        assert_eq!(config.control.tariff_index, 7);
        assert_eq!(config.control.decoder_reference_number, "1234567890123");
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            VendingConfig::from_json_str(r#"{"max_issue_attempts": 0}"#),
            Err(TokenError::Config(_))
        ));
        assert!(matches!(
            VendingConfig::from_json_str(r#"{"token_class": 4}"#),
            Err(TokenError::Config(_))
        ));
        assert!(matches!(
            VendingConfig::from_json_str(
                r#"{"control": {"key_type": 3, "supply_group_code": 560983, "tariff_index": 1,
                    "key_revision_number": 1, "decoder_reference_number": "123"}}"#
            ),
            Err(TokenError::InvalidControlParameter { .. })
        ));
        assert!(matches!(
            VendingConfig::from_json_str("{"),
            Err(TokenError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"token_class": 2}}"#).unwrap();
        let config = VendingConfig::load(file.path()).unwrap();
        assert_eq!(config.token_class, TokenClass::MeterSpecific);

        assert!(matches!(
            VendingConfig::load("/nonexistent/vending.json"),
            Err(TokenError::Config(_))
        ));
    }
}

use crate::domain::donation::PaymentMethod;
use crate::error::{PipelineError, Result};
use ::config::{Config, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Environment overrides look like `DONATION_MAX_DONATION_AMOUNT=250`.
pub const ENV_PREFIX: &str = "DONATION";

/// Static settings handed to the pipeline when it is built.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Largest single donation accepted (inclusive).
    pub max_donation_amount: Decimal,
    pub enabled_payment_methods: BTreeSet<PaymentMethod>,
    pub enforce_campaign_deadline: bool,
    /// Measured in characters.
    pub max_message_length: usize,
    /// Reject donor ids that have no user record.
    pub require_registered_donor: bool,
    /// Fraud score at which a request is rejected.
    pub fraud_reject_score: u32,
    /// Fraud score at which a request is logged for manual review.
    pub fraud_review_score: u32,
    pub large_first_donation: Decimal,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_donation_amount: Decimal::from(10_000),
            enabled_payment_methods: PaymentMethod::ALL.into_iter().collect(),
            enforce_campaign_deadline: true,
            max_message_length: 500,
            require_registered_donor: false,
            fraud_reject_score: 70,
            fraud_review_score: 40,
            large_first_donation: Decimal::from(1_000),
        }
    }
}

impl PipelineConfig {
    /// Layers an optional JSON file and `DONATION_*` environment variables
    /// over the defaults. Missing keys keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Json));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("enabled_payment_methods"),
            )
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_donation_amount <= Decimal::ZERO {
            return Err(PipelineError::Config(
                "max_donation_amount must be positive".to_string(),
            ));
        }
        if self.enabled_payment_methods.is_empty() {
            return Err(PipelineError::Config(
                "at least one payment method must be enabled".to_string(),
            ));
        }
        if self.fraud_review_score > self.fraud_reject_score {
            return Err(PipelineError::Config(
                "fraud_review_score must not exceed fraud_reject_score".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"max_donation_amount": "250", "enabled_payment_methods": ["paypal"]}}"#
        )
        .unwrap();

        let config = PipelineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.max_donation_amount, dec!(250));
        assert_eq!(
            config.enabled_payment_methods,
            BTreeSet::from([PaymentMethod::PayPal])
        );
        assert!(config.enforce_campaign_deadline);
        assert_eq!(config.max_message_length, 500);
        assert_eq!(config.fraud_reject_score, 70);
    }

    #[test]
    fn test_numeric_values_and_fraud_thresholds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"max_donation_amount": 99.5, "fraud_reject_score": 50, "fraud_review_score": 20}}"#
        )
        .unwrap();

        let config = PipelineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.max_donation_amount, dec!(99.5));
        assert_eq!(config.fraud_reject_score, 50);
        assert_eq!(config.fraud_review_score, 20);
    }

    #[test]
    fn test_review_above_reject_is_invalid() {
        let config = PipelineConfig {
            fraud_review_score: 80,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PipelineConfig::from_path(dir.path().join("absent.json")),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_empty_method_set() {
        let config = PipelineConfig {
            enabled_payment_methods: BTreeSet::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_path(file.path()),
            Err(PipelineError::Config(_))
        ));
    }
}

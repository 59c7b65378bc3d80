use crate::config::PipelineConfig;
use crate::domain::donation::{PaymentDetails, PaymentMethod};
use crate::domain::money::Amount;
use crate::error::{PaymentError, ValidationError, ValidationResult};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;

/// Card number that the simulated processor always declines.
pub const DECLINED_CARD_NUMBER: &str = "4000000000000002";
/// PayPal account that the simulated processor always declines.
pub const DECLINED_PAYPAL_EMAIL: &str = "decline@example.com";
/// Bank account that the simulated processor always declines.
pub const DECLINED_BANK_ACCOUNT: &str = "000000000";

/// Result of a charge attempt. A declined charge still carries the
/// processor's transaction id so the failed record stays traceable.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeOutcome {
    pub transaction_id: String,
    pub succeeded: bool,
    pub fee: Decimal,
    /// Display-safe identifier of the funding source.
    pub masked_source: String,
    pub failure_reason: Option<String>,
}

/// One way of paying. Implementations own their field rules and fees.
#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    fn method(&self) -> PaymentMethod;

    fn display_name(&self) -> &'static str;

    fn validate_details(&self, details: &PaymentDetails) -> ValidationResult;

    /// Attempts the charge. `Err` means the processor could not be reached;
    /// a decline is `Ok` with `succeeded == false`.
    async fn charge(&self, amount: Amount, details: &PaymentDetails) -> Result<ChargeOutcome, PaymentError>;
}

fn required<'a>(details: &'a PaymentDetails, field: &str) -> Result<&'a str, ValidationError> {
    details
        .get(field)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ValidationError::invalid_details(field, "is required"))
}

fn digits_only(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, ' ' | '-')).collect()
}

fn is_digits(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.len()) && value.chars().all(|c| c.is_ascii_digit())
}

fn transaction_id(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &id[..8])
}

fn round_fee(fee: Decimal) -> Decimal {
    fee.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn last_four(value: &str) -> String {
    let skip = value.chars().count().saturating_sub(4);
    value.chars().skip(skip).collect()
}

#[derive(Debug, Default, Clone)]
pub struct CreditCardStrategy;

#[async_trait]
impl PaymentStrategy for CreditCardStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::CreditCard
    }

    fn display_name(&self) -> &'static str {
        "Credit Card"
    }

    fn validate_details(&self, details: &PaymentDetails) -> ValidationResult {
        let number = digits_only(required(details, "card_number")?);
        if !is_digits(&number, 16, 16) {
            return Err(ValidationError::invalid_details("card_number", "must be 16 digits"));
        }

        let cvv = required(details, "cvv")?;
        if !is_digits(cvv, 3, 4) {
            return Err(ValidationError::invalid_details("cvv", "must be 3 or 4 digits"));
        }

        let month: u32 = required(details, "expiry_month")?
            .parse()
            .ok()
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| ValidationError::invalid_details("expiry_month", "must be 1-12"))?;
        let year: i32 = required(details, "expiry_year")?
            .parse()
            .map_err(|_| ValidationError::invalid_details("expiry_year", "must be a year"))?;
        let year = if year < 100 { 2000 + year } else { year };

        // a card is valid through the last day of its expiry month
        let today = Utc::now().date_naive();
        if (year, month) < (today.year(), today.month()) {
            return Err(ValidationError::invalid_details("expiry_year", "card has expired"));
        }
        Ok(())
    }

    async fn charge(&self, amount: Amount, details: &PaymentDetails) -> Result<ChargeOutcome, PaymentError> {
        let number = digits_only(details.get("card_number").map(String::as_str).unwrap_or_default());
        let declined = number == DECLINED_CARD_NUMBER;
        Ok(ChargeOutcome {
            transaction_id: transaction_id("cc"),
            succeeded: !declined,
            fee: round_fee(amount.value() * dec!(0.03)),
            masked_source: format!("****-****-****-{}", last_four(&number)),
            failure_reason: declined.then(|| "card declined by issuer".to_string()),
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct PayPalStrategy;

fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
        }
        None => false,
    }
}

#[async_trait]
impl PaymentStrategy for PayPalStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::PayPal
    }

    fn display_name(&self) -> &'static str {
        "PayPal"
    }

    fn validate_details(&self, details: &PaymentDetails) -> ValidationResult {
        let email = required(details, "paypal_email")?;
        if !is_email(email) {
            return Err(ValidationError::invalid_details("paypal_email", "must be an email address"));
        }
        Ok(())
    }

    async fn charge(&self, amount: Amount, details: &PaymentDetails) -> Result<ChargeOutcome, PaymentError> {
        let email = details.get("paypal_email").map(|e| e.trim()).unwrap_or_default();
        let declined = email.eq_ignore_ascii_case(DECLINED_PAYPAL_EMAIL);
        let masked_source = match email.split_once('@') {
            Some((local, domain)) => {
                let shown: String = local.chars().take(2).collect();
                format!("{shown}***@{domain}")
            }
            None => "***".to_string(),
        };
        Ok(ChargeOutcome {
            transaction_id: transaction_id("pp"),
            succeeded: !declined,
            fee: round_fee(amount.value() * dec!(0.029) + dec!(0.30)),
            masked_source,
            failure_reason: declined.then(|| "PayPal account declined the payment".to_string()),
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct BankTransferStrategy;

#[async_trait]
impl PaymentStrategy for BankTransferStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::BankTransfer
    }

    fn display_name(&self) -> &'static str {
        "Bank Transfer"
    }

    fn validate_details(&self, details: &PaymentDetails) -> ValidationResult {
        let routing = digits_only(required(details, "routing_number")?);
        if !is_digits(&routing, 9, 9) {
            return Err(ValidationError::invalid_details("routing_number", "must be 9 digits"));
        }
        let account = digits_only(required(details, "account_number")?);
        if !is_digits(&account, 4, 17) {
            return Err(ValidationError::invalid_details("account_number", "must be 4-17 digits"));
        }
        required(details, "account_holder_name")?;
        Ok(())
    }

    async fn charge(&self, amount: Amount, details: &PaymentDetails) -> Result<ChargeOutcome, PaymentError> {
        let account = digits_only(details.get("account_number").map(String::as_str).unwrap_or_default());
        let declined = account == DECLINED_BANK_ACCOUNT;
        Ok(ChargeOutcome {
            transaction_id: transaction_id("bt"),
            succeeded: !declined,
            fee: round_fee(amount.value() * dec!(0.01)),
            masked_source: format!("****{}", last_four(&account)),
            failure_reason: declined.then(|| "bank rejected the transfer".to_string()),
        })
    }
}

/// Method -> strategy table, fixed when the pipeline is built.
#[derive(Clone, Default)]
pub struct PaymentStrategies {
    strategies: HashMap<PaymentMethod, Arc<dyn PaymentStrategy>>,
}

impl PaymentStrategies {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The bundled strategies for every method the config enables.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut registry = Self::empty();
        for method in &config.enabled_payment_methods {
            let strategy: Arc<dyn PaymentStrategy> = match method {
                PaymentMethod::CreditCard => Arc::new(CreditCardStrategy),
                PaymentMethod::PayPal => Arc::new(PayPalStrategy),
                PaymentMethod::BankTransfer => Arc::new(BankTransferStrategy),
            };
            registry.register(strategy);
        }
        registry
    }

    /// Adds or replaces the strategy for its method.
    pub fn register(&mut self, strategy: Arc<dyn PaymentStrategy>) {
        self.strategies.insert(strategy.method(), strategy);
    }

    pub fn get(&self, method: PaymentMethod) -> Option<Arc<dyn PaymentStrategy>> {
        self.strategies.get(&method).cloned()
    }

    /// Looks up a strategy by its wire key. Unknown or disabled keys give `None`.
    pub fn resolve(&self, key: &str) -> Option<Arc<dyn PaymentStrategy>> {
        key.parse::<PaymentMethod>().ok().and_then(|method| self.get(method))
    }

    /// `(key, display name)` for each registered method, in key order.
    pub fn available_methods(&self) -> Vec<(&'static str, &'static str)> {
        let mut methods: Vec<_> = self
            .strategies
            .values()
            .map(|s| (s.method().key(), s.display_name()))
            .collect();
        methods.sort();
        methods
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn details(pairs: &[(&str, &str)]) -> PaymentDetails {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn card(number: &str) -> PaymentDetails {
        details(&[
            ("card_number", number),
            ("cvv", "123"),
            ("expiry_month", "12"),
            ("expiry_year", "2099"),
        ])
    }

    #[test]
    fn test_credit_card_rules() {
        let strategy = CreditCardStrategy;
        assert!(strategy.validate_details(&card("4242 4242 4242 4242")).is_ok());

        let err = strategy.validate_details(&card("4242")).unwrap_err();
        assert_eq!(err.field, "card_number");

        let mut bad_cvv = card("4242424242424242");
        bad_cvv.insert("cvv".into(), "12".into());
        assert_eq!(strategy.validate_details(&bad_cvv).unwrap_err().field, "cvv");

        let mut expired = card("4242424242424242");
        expired.insert("expiry_year".into(), "2001".into());
        assert_eq!(strategy.validate_details(&expired).unwrap_err().field, "expiry_year");

        let mut missing = card("4242424242424242");
        missing.remove("expiry_month");
        assert_eq!(strategy.validate_details(&missing).unwrap_err().field, "expiry_month");
    }

    #[test]
    fn test_paypal_and_bank_rules() {
        assert!(PayPalStrategy.validate_details(&details(&[("paypal_email", "jo@example.com")])).is_ok());
        assert!(PayPalStrategy.validate_details(&details(&[("paypal_email", "jo@localhost")])).is_err());

        let bank = details(&[
            ("routing_number", "021000021"),
            ("account_number", "123456789"),
            ("account_holder_name", "Jo Doe"),
        ]);
        assert!(BankTransferStrategy.validate_details(&bank).is_ok());

        let mut short_routing = bank.clone();
        short_routing.insert("routing_number".into(), "1234".into());
        assert_eq!(
            BankTransferStrategy.validate_details(&short_routing).unwrap_err().field,
            "routing_number"
        );
    }

    #[tokio::test]
    async fn test_charge_fees_and_ids() {
        let amount = Amount::new(dec!(100)).unwrap();

        let cc = CreditCardStrategy.charge(amount, &card("4242424242424242")).await.unwrap();
        assert!(cc.succeeded);
        assert!(cc.transaction_id.starts_with("cc_"));
        assert_eq!(cc.transaction_id.len(), 11);
        assert_eq!(cc.fee, dec!(3.00));
        assert_eq!(cc.masked_source, "****-****-****-4242");

        let pp = PayPalStrategy
            .charge(amount, &details(&[("paypal_email", "jordan@example.com")]))
            .await
            .unwrap();
        assert_eq!(pp.fee, dec!(3.20));
        assert_eq!(pp.masked_source, "jo***@example.com");

        let bt = BankTransferStrategy
            .charge(amount, &details(&[("account_number", "123456789")]))
            .await
            .unwrap();
        assert_eq!(bt.fee, dec!(1.00));
        assert_eq!(bt.masked_source, "****6789");
    }

    #[tokio::test]
    async fn test_sentinels_decline() {
        let amount = Amount::new(dec!(10)).unwrap();
        let outcome = CreditCardStrategy.charge(amount, &card(DECLINED_CARD_NUMBER)).await.unwrap();
        assert!(!outcome.succeeded);
        assert!(outcome.failure_reason.is_some());

        let outcome = BankTransferStrategy
            .charge(amount, &details(&[("account_number", DECLINED_BANK_ACCOUNT)]))
            .await
            .unwrap();
        assert!(!outcome.succeeded);
    }

    #[test]
    fn test_registry_honours_enabled_methods() {
        let config = PipelineConfig {
            enabled_payment_methods: BTreeSet::from([PaymentMethod::PayPal]),
            ..Default::default()
        };
        let registry = PaymentStrategies::from_config(&config);
        assert!(registry.resolve("paypal").is_some());
        assert!(registry.resolve("credit_card").is_none());
        assert!(registry.resolve("bitcoin").is_none());
        assert_eq!(registry.available_methods(), vec![("paypal", "PayPal")]);
    }
}

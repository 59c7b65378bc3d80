//! Fail-fast checks run against a donation request before anything is
//! charged or written.
//!
//! A [`ValidationChain`] is an ordered list of independent [`DonationCheck`]s.
//! Checks are pure: they read the [`ValidationContext`] and return a
//! [`ValidationResult`]. The first failure wins and later checks never run.

use super::payment::PaymentStrategies;
use crate::config::PipelineConfig;
use crate::domain::campaign::Campaign;
use crate::domain::donation::DonationRequest;
use crate::domain::user::User;
use crate::error::{ValidationError, ValidationErrorKind, ValidationResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Everything a check may look at. Lookups happen before the chain runs.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub request: &'a DonationRequest,
    pub campaign: Option<&'a Campaign>,
    pub donor: Option<&'a User>,
    pub now: DateTime<Utc>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(request: &'a DonationRequest, campaign: Option<&'a Campaign>) -> Self {
        Self {
            request,
            campaign,
            donor: None,
            now: Utc::now(),
        }
    }

    pub fn with_donor(mut self, donor: Option<&'a User>) -> Self {
        self.donor = donor;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

pub trait DonationCheck: Send + Sync {
    /// Stable name used to insert, replace or remove the check.
    fn name(&self) -> &str;

    fn check(&self, ctx: &ValidationContext<'_>) -> ValidationResult;
}

/// Adapts a plain function or closure into a named check.
pub struct FnCheck<F> {
    name: String,
    f: F,
}

impl<F> FnCheck<F>
where
    F: Fn(&ValidationContext<'_>) -> ValidationResult + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> DonationCheck for FnCheck<F>
where
    F: Fn(&ValidationContext<'_>) -> ValidationResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        (self.f)(ctx)
    }
}

pub const AMOUNT_CHECK: &str = "amount";
pub const CAMPAIGN_STATE_CHECK: &str = "campaign_state";
pub const PAYMENT_METHOD_CHECK: &str = "payment_method";
pub const PAYMENT_DETAILS_CHECK: &str = "payment_details";
pub const FRAUD_CHECK: &str = "fraud";
pub const DONOR_CHECK: &str = "donor";
pub const MESSAGE_CHECK: &str = "message";

/// `0 < amount <= max`.
pub struct AmountCheck {
    pub max: Decimal,
}

impl DonationCheck for AmountCheck {
    fn name(&self) -> &str {
        AMOUNT_CHECK
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        let amount = ctx.request.amount;
        if amount <= Decimal::ZERO {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidAmount,
                "amount",
                "must be greater than 0",
            ));
        }
        if amount > self.max {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidAmount,
                "amount",
                format!("exceeds the maximum of {}", self.max),
            ));
        }
        Ok(())
    }
}

/// Campaign exists, is Active, and (optionally) its deadline has not passed.
pub struct CampaignStateCheck {
    pub enforce_deadline: bool,
}

impl DonationCheck for CampaignStateCheck {
    fn name(&self) -> &str {
        CAMPAIGN_STATE_CHECK
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        let reject = |reason: String| {
            Err(ValidationError::new(
                ValidationErrorKind::CampaignNotAcceptingDonations,
                "campaign_id",
                reason,
            ))
        };
        let Some(campaign) = ctx.campaign else {
            return reject(format!("campaign `{}` does not exist", ctx.request.campaign_id));
        };
        if !campaign.accepts_donations(ctx.now, self.enforce_deadline) {
            return reject(match campaign.deadline {
                Some(deadline) if self.enforce_deadline && ctx.now > deadline => {
                    format!("campaign `{}` ended on {}", campaign.id, deadline.date_naive())
                }
                _ => format!("campaign `{}` is {}", campaign.id, campaign.status.as_str()),
            });
        }
        Ok(())
    }
}

fn unsupported(key: &str) -> ValidationError {
    ValidationError::new(
        ValidationErrorKind::UnsupportedPaymentMethod,
        "payment_method",
        format!("`{key}` is not an accepted payment method"),
    )
}

/// The requested method maps to an enabled strategy.
pub struct PaymentMethodCheck {
    pub strategies: PaymentStrategies,
}

impl DonationCheck for PaymentMethodCheck {
    fn name(&self) -> &str {
        PAYMENT_METHOD_CHECK
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        let key = &ctx.request.payment_method;
        match self.strategies.resolve(key) {
            Some(_) => Ok(()),
            None => Err(unsupported(key)),
        }
    }
}

/// Delegates to the selected strategy's own field rules.
pub struct PaymentDetailsCheck {
    pub strategies: PaymentStrategies,
}

impl DonationCheck for PaymentDetailsCheck {
    fn name(&self) -> &str {
        PAYMENT_DETAILS_CHECK
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        let key = &ctx.request.payment_method;
        let strategy = self.strategies.resolve(key).ok_or_else(|| unsupported(key))?;
        strategy.validate_details(&ctx.request.payment_details)
    }
}

/// Amounts that show up disproportionately in card-testing attacks.
const SUSPICIOUS_AMOUNTS: [Decimal; 4] = [dec!(999.99), dec!(1000), dec!(5000), dec!(9999.99)];

/// Publicly documented test card prefixes.
const TEST_CARD_PATTERNS: [&str; 2] = ["4111111111111111", "4000000000000000"];

const LARGE_FIRST_DONATION_SCORE: u32 = 30;
const TEST_CARD_SCORE: u32 = 20;
const SUSPICIOUS_AMOUNT_SCORE: u32 = 15;

/// Scores a request on a few fraud signals. At `reject_score` the request is
/// turned away; at `review_score` it passes but is logged for manual review.
pub struct FraudCheck {
    pub reject_score: u32,
    pub review_score: u32,
    /// Amounts above this from a donor without an account count as a signal.
    pub large_first_donation: Decimal,
}

impl FraudCheck {
    /// Total score and the signals that contributed to it.
    pub fn score(&self, ctx: &ValidationContext<'_>) -> (u32, Vec<&'static str>) {
        let request = ctx.request;
        let mut score = 0;
        let mut signals = Vec::new();

        if request.amount > self.large_first_donation && ctx.donor.is_none() {
            score += LARGE_FIRST_DONATION_SCORE;
            signals.push("large amount from first-time donor");
        }
        if let Some(card) = request.payment_details.get("card_number") {
            let digits: String = card.chars().filter(char::is_ascii_digit).collect();
            if TEST_CARD_PATTERNS.iter().any(|pattern| digits.contains(pattern)) {
                score += TEST_CARD_SCORE;
                signals.push("test card number");
            }
        }
        if SUSPICIOUS_AMOUNTS.contains(&request.amount) {
            score += SUSPICIOUS_AMOUNT_SCORE;
            signals.push("amount matches a common fraud pattern");
        }
        (score, signals)
    }
}

impl DonationCheck for FraudCheck {
    fn name(&self) -> &str {
        FRAUD_CHECK
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        let (score, signals) = self.score(ctx);
        if score >= self.reject_score {
            return Err(ValidationError::new(
                ValidationErrorKind::SuspectedFraud,
                "donation",
                format!("high fraud risk (score {score}): {}", signals.join(", ")),
            ));
        }
        if score >= self.review_score {
            tracing::warn!(
                campaign = %ctx.request.campaign_id,
                score,
                signals = ?signals,
                "donation flagged for review"
            );
        }
        Ok(())
    }
}

/// Named donors must be present and active; anonymous gifts may omit the id.
pub struct DonorCheck {
    pub require_registered: bool,
}

impl DonationCheck for DonorCheck {
    fn name(&self) -> &str {
        DONOR_CHECK
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        let invalid = |reason: &str| {
            Err(ValidationError::new(
                ValidationErrorKind::InvalidDonor,
                "donor_id",
                reason,
            ))
        };
        match (ctx.request.donor_id.as_deref(), ctx.donor) {
            (None, _) if ctx.request.anonymous => Ok(()),
            (None, _) => invalid("is required unless the donation is anonymous"),
            (Some(_), Some(donor)) if !donor.is_active => invalid("donor account is inactive"),
            (Some(_), Some(_)) => Ok(()),
            (Some(_), None) if self.require_registered => invalid("donor is not registered"),
            (Some(_), None) => Ok(()),
        }
    }
}

/// Optional message stays within the configured number of characters.
pub struct MessageCheck {
    pub max_len: usize,
}

impl DonationCheck for MessageCheck {
    fn name(&self) -> &str {
        MESSAGE_CHECK
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        match &ctx.request.message {
            Some(message) if message.chars().count() > self.max_len => Err(ValidationError::new(
                ValidationErrorKind::MessageTooLong,
                "message",
                format!("must be at most {} characters", self.max_len),
            )),
            _ => Ok(()),
        }
    }
}

/// Ordered, fail-fast list of checks.
#[derive(Clone, Default)]
pub struct ValidationChain {
    checks: Vec<Arc<dyn DonationCheck>>,
}

impl ValidationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chain: amount, campaign state, payment method, payment
    /// details, fraud screening, donor, message.
    pub fn standard(config: &PipelineConfig, strategies: &PaymentStrategies) -> Self {
        let mut chain = Self::new();
        chain
            .push(AmountCheck {
                max: config.max_donation_amount,
            })
            .push(CampaignStateCheck {
                enforce_deadline: config.enforce_campaign_deadline,
            })
            .push(PaymentMethodCheck {
                strategies: strategies.clone(),
            })
            .push(PaymentDetailsCheck {
                strategies: strategies.clone(),
            })
            .push(FraudCheck {
                reject_score: config.fraud_reject_score,
                review_score: config.fraud_review_score,
                large_first_donation: config.large_first_donation,
            })
            .push(DonorCheck {
                require_registered: config.require_registered_donor,
            })
            .push(MessageCheck {
                max_len: config.max_message_length,
            });
        chain
    }

    pub fn push(&mut self, check: impl DonationCheck + 'static) -> &mut Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Inserts `check` right before the check called `before`. Returns `false`
    /// (and leaves the chain untouched) if there is no such check.
    pub fn insert_before(&mut self, before: &str, check: impl DonationCheck + 'static) -> bool {
        match self.position(before) {
            Some(index) => {
                self.checks.insert(index, Arc::new(check));
                true
            }
            None => false,
        }
    }

    /// Swaps the check called `name` for `check`, keeping its position.
    pub fn replace(&mut self, name: &str, check: impl DonationCheck + 'static) -> bool {
        match self.position(name) {
            Some(index) => {
                self.checks[index] = Arc::new(check);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(index) => {
                self.checks.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.checks.iter().position(|c| c.name() == name)
    }

    /// Runs every check in order, stopping at the first failure.
    pub fn validate(&self, ctx: &ValidationContext<'_>) -> ValidationResult {
        for check in &self.checks {
            check.check(ctx).inspect_err(|err| {
                tracing::debug!(check = check.name(), field = %err.field, "validation failed");
            })?;
        }
        Ok(())
    }
}

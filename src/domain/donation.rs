use super::money::Amount;
use super::ports::Entity;
use crate::error::TransitionError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    PayPal,
    BankTransfer,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [Self::CreditCard, Self::PayPal, Self::BankTransfer];

    /// Key used on the wire and in configuration.
    pub fn key(&self) -> &'static str {
        match self {
            Self::CreditCard => "credit_card",
            Self::PayPal => "paypal",
            Self::BankTransfer => "bank_transfer",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "credit_card" | "creditcard" | "card" => Ok(Self::CreditCard),
            "paypal" | "pay_pal" => Ok(Self::PayPal),
            "bank_transfer" | "banktransfer" | "bank" => Ok(Self::BankTransfer),
            other => Err(format!("unknown payment method `{other}`")),
        }
    }
}

/// Method-specific fields such as `card_number` or `paypal_email`.
pub type PaymentDetails = BTreeMap<String, String>;

/// An incoming donation as handed over by the web layer.
///
/// `amount` and `payment_method` are kept raw: a non-positive amount or an
/// unknown method is a validation outcome, not a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationRequest {
    pub campaign_id: String,
    pub donor_id: Option<String>,
    pub amount: Decimal,
    pub payment_method: String,
    #[serde(default)]
    pub payment_details: PaymentDetails,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Completed,
    Failed,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A persisted donation attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationRecord {
    pub donation_id: String,
    pub campaign_id: String,
    pub donor_id: Option<String>,
    pub amount: Amount,
    pub payment_method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub status: DonationStatus,
    pub anonymous: bool,
    pub message: Option<String>,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub receipt_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DonationRecord {
    /// Starts a record in `Pending` with a freshly generated id.
    pub fn pending(request: &DonationRequest, amount: Amount, method: PaymentMethod) -> Self {
        Self {
            donation_id: uuid::Uuid::new_v4().simple().to_string(),
            campaign_id: request.campaign_id.clone(),
            donor_id: request.donor_id.clone(),
            amount,
            payment_method: method,
            transaction_id: None,
            status: DonationStatus::Pending,
            anonymous: request.anonymous,
            message: request.message.clone(),
            fee: Decimal::ZERO,
            net_amount: amount.value(),
            receipt_id: None,
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn ensure_pending(&self, to: DonationStatus) -> Result<(), TransitionError> {
        if self.status == DonationStatus::Pending {
            Ok(())
        } else {
            Err(TransitionError {
                donation_id: self.donation_id.clone(),
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    /// Pending -> Completed. Records the transaction, fee and a receipt id.
    pub fn complete(&mut self, transaction_id: String, fee: Decimal) -> Result<(), TransitionError> {
        self.ensure_pending(DonationStatus::Completed)?;
        self.status = DonationStatus::Completed;
        self.transaction_id = Some(transaction_id);
        self.fee = fee;
        self.net_amount = self.amount.value() - fee;
        self.completed_at = Some(Utc::now());
        self.receipt_id = Some(self.receipt_number());
        Ok(())
    }

    /// Pending -> Failed.
    pub fn fail(
        &mut self,
        transaction_id: Option<String>,
        reason: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.ensure_pending(DonationStatus::Failed)?;
        self.status = DonationStatus::Failed;
        self.transaction_id = transaction_id;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// `ORD-YYYYMMDD-XXXX`, the suffix being the last four id characters.
    fn receipt_number(&self) -> String {
        let date_part = self.created_at.format("%Y%m%d");
        let skip = self.donation_id.chars().count().saturating_sub(4);
        let id_part: String = self.donation_id.chars().skip(skip).collect();
        let id_part = id_part.to_uppercase();
        format!("ORD-{date_part}-{id_part}")
    }
}

/// Donation records are write-once: updates never change a terminal record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DonationPatch {
    pub message: Option<String>,
}

impl Entity for DonationRecord {
    const COLLECTION: &'static str = "donations";
    type Patch = DonationPatch;

    fn id(&self) -> &str {
        &self.donation_id
    }

    fn assign_id(&mut self, id: String) {
        self.donation_id = id;
    }

    fn apply(&mut self, patch: &DonationPatch) {
        if self.status.is_terminal() {
            return;
        }
        if let Some(message) = &patch.message {
            self.message = Some(message.clone());
        }
    }
}

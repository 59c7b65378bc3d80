use std::fmt;
use thiserror::Error;

/// Why a donation request was turned away before any side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    InvalidAmount,
    CampaignNotAcceptingDonations,
    UnsupportedPaymentMethod,
    InvalidPaymentDetails,
    InvalidDonor,
    MessageTooLong,
    SuspectedFraud,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidAmount => "InvalidAmount",
            Self::CampaignNotAcceptingDonations => "CampaignNotAcceptingDonations",
            Self::UnsupportedPaymentMethod => "UnsupportedPaymentMethod",
            Self::InvalidPaymentDetails => "InvalidPaymentDetails",
            Self::InvalidDonor => "InvalidDonor",
            Self::MessageTooLong => "MessageTooLong",
            Self::SuspectedFraud => "SuspectedFraud",
        };
        f.write_str(name)
    }
}

/// Client-caused rejection. Carries the offending field so the web layer can
/// point at it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} on `{field}`: {reason}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_details(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ValidationErrorKind::InvalidPaymentDetails, field, reason)
    }
}

/// `Ok(())` is a pass; the first failing check produces the error.
pub type ValidationResult = std::result::Result<(), ValidationError>;

/// A charge was attempted and did not go through.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("payment failed: {reason}")]
pub struct PaymentError {
    pub reason: String,
}

impl PaymentError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Storage is unavailable or returned something unusable. Fatal to the
/// submission that hit it; never retried internally.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("{collection} entry `{id}` already exists")]
    Duplicate { collection: &'static str, id: String },
    #[error("{collection} entry `{id}` disappeared mid-submission")]
    Missing { collection: &'static str, id: String },
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("refusing to rewrite a finished donation: {0}")]
    Immutable(#[from] TransitionError),
}

/// A subscriber failed. Absorbed by the notification bus and reported to its
/// error sink; never reaches the submitter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("handler `{handler}` failed: {reason}")]
pub struct NotificationError {
    pub handler: String,
    pub reason: String,
}

impl NotificationError {
    pub fn new(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            reason: reason.into(),
        }
    }
}

/// Illegal status change on a donation record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("donation `{donation_id}` cannot move from {from} to {to}")]
pub struct TransitionError {
    pub donation_id: String,
    pub from: String,
    pub to: String,
}

/// Caller-facing reason carried by a donation outcome that did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// Errors surfaced by the binary and the surrounding plumbing (config files,
/// CSV input, timeouts).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Malformed input: {0}")]
    Input(String),
    #[error("submission timed out after {0:?}; the donation may still have been charged and recorded")]
    TimedOut(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

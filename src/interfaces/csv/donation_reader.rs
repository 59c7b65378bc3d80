use crate::domain::donation::{DonationRequest, PaymentDetails};
use crate::error::{PipelineError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One line of a requests file.
///
/// `details` packs the payment fields as `key=value;key=value`.
#[derive(Debug, Deserialize)]
struct DonationRow {
    campaign_id: String,
    donor_id: Option<String>,
    amount: Decimal,
    method: String,
    anonymous: Option<bool>,
    message: Option<String>,
    details: Option<String>,
}

/// Parses `card_number=4242...;cvv=123` into a field map.
pub fn parse_details(raw: &str) -> Result<PaymentDetails> {
    raw.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                PipelineError::Input(format!("payment detail `{pair}` is not key=value"))
            })?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

impl DonationRow {
    fn into_request(self) -> Result<DonationRequest> {
        let payment_details = match self.details.as_deref() {
            Some(raw) => parse_details(raw)?,
            None => PaymentDetails::new(),
        };
        Ok(DonationRequest {
            campaign_id: self.campaign_id,
            donor_id: self.donor_id.filter(|id| !id.is_empty()),
            amount: self.amount,
            payment_method: self.method,
            payment_details,
            anonymous: self.anonymous.unwrap_or(false),
            message: self.message.filter(|m| !m.is_empty()),
        })
    }
}

/// Reads donation requests from a CSV source.
///
/// Rows are trimmed and may omit trailing optional columns.
pub struct DonationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> DonationReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader_builder().from_reader(source),
        }
    }

    /// Lazily yields one request per row. A bad row is an `Err` item and does
    /// not stop the rows after it.
    pub fn requests(self) -> impl Iterator<Item = Result<DonationRequest>> {
        self.reader
            .into_deserialize::<DonationRow>()
            .map(|row| row?.into_request())
    }
}

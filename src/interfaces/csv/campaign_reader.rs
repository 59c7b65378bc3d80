use crate::domain::campaign::{Campaign, CampaignStatus};
use crate::domain::money::Balance;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct CampaignRow {
    id: String,
    title: Option<String>,
    goal_amount: Decimal,
    current_amount: Option<Decimal>,
    deadline: Option<String>,
    status: Option<String>,
}

/// Accepts RFC 3339 timestamps or a bare date, which means the end of that
/// day in UTC.
pub fn parse_deadline(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .map(|at| at.and_utc())
        .ok_or_else(|| PipelineError::Input(format!("deadline `{raw}` is not a date")))
}

impl CampaignRow {
    fn into_campaign(self) -> Result<Campaign> {
        if self.goal_amount <= Decimal::ZERO {
            return Err(PipelineError::Input(format!(
                "campaign `{}` needs a positive goal",
                self.id
            )));
        }
        let title = self.title.unwrap_or_else(|| self.id.clone());
        let mut campaign = Campaign::new(self.id, title, self.goal_amount);
        if let Some(raw) = self.deadline.as_deref() {
            campaign = campaign.with_deadline(parse_deadline(raw)?);
        }
        if let Some(raw) = self.status.as_deref() {
            campaign = campaign.with_status(raw.parse::<CampaignStatus>().map_err(PipelineError::Input)?);
        }
        if let Some(raised) = self.current_amount {
            campaign.current_amount = Balance::new(raised.max(Decimal::ZERO));
        }
        Ok(campaign)
    }
}

/// Reads the campaigns a run starts from.
pub struct CampaignReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CampaignReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: super::reader_builder().from_reader(source),
        }
    }

    pub fn campaigns(self) -> impl Iterator<Item = Result<Campaign>> {
        self.reader
            .into_deserialize::<CampaignRow>()
            .map(|row| row?.into_campaign())
    }
}

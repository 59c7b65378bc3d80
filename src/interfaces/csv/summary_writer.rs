use crate::application::pipeline::DonationOutcome;
use crate::domain::campaign::Campaign;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct CampaignSummaryRow<'a> {
    campaign: &'a str,
    raised: String,
    goal: String,
    donations: u64,
    status: &'static str,
}

/// Writes the end-of-run campaign totals as
/// `campaign,raised,goal,donations,status`.
pub struct SummaryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SummaryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_campaigns<'a>(&mut self, campaigns: impl IntoIterator<Item = &'a Campaign>) -> Result<()> {
        for campaign in campaigns {
            self.writer.serialize(CampaignSummaryRow {
                campaign: &campaign.id,
                raised: campaign.current_amount.to_string(),
                goal: campaign.goal_amount.to_string(),
                donations: campaign.donation_count,
                status: campaign.status.as_str(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct OutcomeRow<'a> {
    line: usize,
    status: String,
    stage: &'static str,
    donation_id: Option<&'a str>,
    transaction_id: Option<&'a str>,
    receipt_id: Option<&'a str>,
    error: Option<String>,
}

/// One row per submitted request, keyed by its line in the input file.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_outcome(&mut self, line: usize, outcome: &DonationOutcome) -> Result<()> {
        self.writer.serialize(OutcomeRow {
            line,
            status: outcome.status.to_string(),
            stage: outcome.stage.as_str(),
            donation_id: outcome.donation_id.as_deref(),
            transaction_id: outcome.transaction_id.as_deref(),
            receipt_id: outcome.receipt_id.as_deref(),
            error: outcome.error.as_ref().map(ToString::to_string),
        })?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

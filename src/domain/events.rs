use super::donation::DonationRecord;
use super::money::Balance;
use serde::{Deserialize, Serialize};

/// Discriminator used to subscribe to one kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DonationRecorded,
    CampaignGoalReached,
}

/// Something that happened inside the pipeline. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    DonationRecorded {
        record: DonationRecord,
    },
    CampaignGoalReached {
        campaign_id: String,
        goal_amount: Balance,
        current_amount: Balance,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::DonationRecorded { .. } => EventKind::DonationRecorded,
            Self::CampaignGoalReached { .. } => EventKind::CampaignGoalReached,
        }
    }

    pub fn campaign_id(&self) -> &str {
        match self {
            Self::DonationRecorded { record } => &record.campaign_id,
            Self::CampaignGoalReached { campaign_id, .. } => campaign_id,
        }
    }
}

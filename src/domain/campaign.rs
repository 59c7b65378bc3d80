use super::money::{Amount, Balance};
use super::ports::Entity;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("unknown campaign status `{other}`")),
        }
    }
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A fundraising goal that donations are credited against.
///
/// `current_amount` only grows, and only through [`CampaignPatch::credit`]
/// applied by the pipeline after a completed charge.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Campaign {
    pub id: String,
    pub title: String,
    pub goal_amount: Balance,
    pub current_amount: Balance,
    pub donation_count: u64,
    pub deadline: Option<DateTime<Utc>>,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    /// Donation whose credit met the goal and completed the campaign.
    #[serde(default)]
    pub completed_by: Option<String>,
}

impl Campaign {
    pub fn new(id: impl Into<String>, title: impl Into<String>, goal_amount: Decimal) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            goal_amount: Balance::new(goal_amount),
            current_amount: Balance::ZERO,
            donation_count: 0,
            deadline: None,
            status: CampaignStatus::Active,
            created_at: Utc::now(),
            completed_by: None,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_status(mut self, status: CampaignStatus) -> Self {
        self.status = status;
        self
    }

    /// Active and, when deadlines are enforced, not yet past its deadline.
    pub fn accepts_donations(&self, now: DateTime<Utc>, enforce_deadline: bool) -> bool {
        if self.status != CampaignStatus::Active {
            return false;
        }
        match self.deadline {
            Some(deadline) if enforce_deadline => now <= deadline,
            _ => true,
        }
    }

    pub fn goal_reached(&self) -> bool {
        self.current_amount >= self.goal_amount
    }

    /// Progress towards the goal, capped at 100.
    pub fn progress_percentage(&self) -> Decimal {
        if self.goal_amount.value() <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let pct = self.current_amount.value() / self.goal_amount.value() * Decimal::ONE_HUNDRED;
        pct.min(Decimal::ONE_HUNDRED)
    }

    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deadline
            .map(|deadline| (deadline - now).num_days().max(0))
    }
}

/// A completed donation's contribution to a campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct Credit {
    pub amount: Amount,
    pub donation_id: String,
}

/// Storage-level change to a campaign. `credit` is an atomic increment of the
/// raised total and donation count; an Active campaign whose total meets the
/// goal completes in the same write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignPatch {
    pub credit: Option<Credit>,
    pub status: Option<CampaignStatus>,
}

impl CampaignPatch {
    pub fn credit(amount: Amount, donation_id: impl Into<String>) -> Self {
        Self {
            credit: Some(Credit {
                amount,
                donation_id: donation_id.into(),
            }),
            status: None,
        }
    }

    pub fn status(status: CampaignStatus) -> Self {
        Self {
            credit: None,
            status: Some(status),
        }
    }
}

impl Entity for Campaign {
    const COLLECTION: &'static str = "campaigns";
    type Patch = CampaignPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn assign_id(&mut self, id: String) {
        self.id = id;
    }

    fn apply(&mut self, patch: &CampaignPatch) {
        if let Some(credit) = &patch.credit {
            self.current_amount += credit.amount;
            self.donation_count += 1;
            if self.status == CampaignStatus::Active && self.goal_reached() {
                self.status = CampaignStatus::Completed;
                self.completed_by = Some(credit.donation_id.clone());
            }
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Orderings offered for campaign listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignSort {
    Raised(SortDirection),
    Created(SortDirection),
    Progress(SortDirection),
    /// Ascending puts the nearest deadline first. Campaigns without a
    /// deadline always sort last.
    Deadline(SortDirection),
    Popularity(SortDirection),
}

impl CampaignSort {
    pub fn compare(&self, a: &Campaign, b: &Campaign) -> Ordering {
        let (ordering, direction) = match *self {
            Self::Raised(dir) => (a.current_amount.cmp(&b.current_amount), dir),
            Self::Created(dir) => (a.created_at.cmp(&b.created_at), dir),
            Self::Progress(dir) => (a.progress_percentage().cmp(&b.progress_percentage()), dir),
            Self::Popularity(dir) => (a.donation_count.cmp(&b.donation_count), dir),
            Self::Deadline(dir) => match (a.deadline, b.deadline) {
                (Some(x), Some(y)) => (x.cmp(&y), dir),
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => return Ordering::Equal,
            },
        };
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_accepts_donations_respects_status_and_deadline() {
        let now = Utc::now();
        let campaign = Campaign::new("c1", "Wells", dec!(100)).with_deadline(now - Duration::days(1));
        assert!(!campaign.accepts_donations(now, true));
        assert!(campaign.accepts_donations(now, false));

        let paused = Campaign::new("c2", "Books", dec!(100)).with_status(CampaignStatus::Paused);
        assert!(!paused.accepts_donations(now, false));
    }

    #[test]
    fn test_credit_patch_increments_total_and_count() {
        let mut campaign = Campaign::new("c1", "Wells", dec!(100));
        campaign.apply(&CampaignPatch::credit(Amount::new(dec!(40)).unwrap(), "d1"));
        assert_eq!(campaign.status, CampaignStatus::Active);
        campaign.apply(&CampaignPatch::credit(Amount::new(dec!(60)).unwrap(), "d2"));
        assert_eq!(campaign.current_amount, Balance::new(dec!(100)));
        assert_eq!(campaign.donation_count, 2);
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.completed_by.as_deref(), Some("d2"));

        // late credits still count but do not move the completion marker
        campaign.apply(&CampaignPatch::credit(Amount::new(dec!(5)).unwrap(), "d3"));
        assert_eq!(campaign.current_amount, Balance::new(dec!(105)));
        assert_eq!(campaign.completed_by.as_deref(), Some("d2"));
    }

    #[test]
    fn test_credit_completes_campaign_already_at_goal() {
        let mut campaign = Campaign::new("c1", "Wells", dec!(100));
        campaign.current_amount = Balance::new(dec!(100));
        campaign.apply(&CampaignPatch::credit(Amount::new(dec!(10)).unwrap(), "d1"));
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.completed_by.as_deref(), Some("d1"));

        let mut cancelled = Campaign::new("c2", "Books", dec!(10)).with_status(CampaignStatus::Cancelled);
        cancelled.apply(&CampaignPatch::credit(Amount::new(dec!(10)).unwrap(), "d2"));
        assert_eq!(cancelled.status, CampaignStatus::Cancelled);
        assert!(cancelled.completed_by.is_none());
    }

    #[test]
    fn test_progress_is_capped() {
        let mut campaign = Campaign::new("c1", "Wells", dec!(50));
        campaign.current_amount = Balance::new(dec!(75));
        assert_eq!(campaign.progress_percentage(), dec!(100));
        campaign.current_amount = Balance::new(dec!(25));
        assert_eq!(campaign.progress_percentage(), dec!(50));
    }

    #[test]
    fn test_deadline_sort_puts_open_ended_last() {
        let now = Utc::now();
        let soon = Campaign::new("soon", "a", dec!(1)).with_deadline(now + Duration::days(1));
        let later = Campaign::new("later", "b", dec!(1)).with_deadline(now + Duration::days(9));
        let open = Campaign::new("open", "c", dec!(1));

        let mut all = vec![open.clone(), later.clone(), soon.clone()];
        all.sort_by(|a, b| CampaignSort::Deadline(SortDirection::Ascending).compare(a, b));
        let ids: Vec<_> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["soon", "later", "open"]);

        all.sort_by(|a, b| CampaignSort::Deadline(SortDirection::Descending).compare(a, b));
        let ids: Vec<_> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["later", "soon", "open"]);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Active".parse::<CampaignStatus>(), Ok(CampaignStatus::Active));
        assert_eq!("canceled".parse::<CampaignStatus>(), Ok(CampaignStatus::Cancelled));
        assert!("archived".parse::<CampaignStatus>().is_err());
    }
}

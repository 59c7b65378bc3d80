use super::notification::EventHandler;
use crate::domain::events::DomainEvent;
use crate::domain::donation::DonationStatus;
use crate::error::NotificationError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Aggregates seen by [`AnalyticsSubscriber`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyticsSnapshot {
    pub donations: u64,
    pub total_raised: Decimal,
    pub total_fees: Decimal,
    pub per_campaign: BTreeMap<String, u64>,
    pub goals_reached: BTreeSet<String>,
}

/// Keeps running donation totals in memory.
#[derive(Debug, Default)]
pub struct AnalyticsSubscriber {
    stats: Mutex<AnalyticsSnapshot>,
}

impl AnalyticsSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventHandler for AnalyticsSubscriber {
    fn name(&self) -> &str {
        "analytics"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), NotificationError> {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            DomainEvent::DonationRecorded { record } => {
                if record.status != DonationStatus::Completed {
                    return Err(NotificationError::new(
                        self.name(),
                        format!("donation `{}` is {}", record.donation_id, record.status.as_str()),
                    ));
                }
                stats.donations += 1;
                stats.total_raised += record.amount.value();
                stats.total_fees += record.fee;
                *stats.per_campaign.entry(record.campaign_id.clone()).or_default() += 1;
            }
            DomainEvent::CampaignGoalReached { campaign_id, .. } => {
                stats.goals_reached.insert(campaign_id.clone());
            }
        }
        Ok(())
    }
}

/// Emits one structured `audit` log line per event.
#[derive(Debug, Default)]
pub struct AuditLogSubscriber {
    logged: AtomicU64,
}

impl AuditLogSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logged(&self) -> u64 {
        self.logged.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventHandler for AuditLogSubscriber {
    fn name(&self) -> &str {
        "audit-log"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), NotificationError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| NotificationError::new(self.name(), e.to_string()))?;
        tracing::info!(
            target: "audit",
            kind = ?event.kind(),
            campaign = event.campaign_id(),
            %payload,
            "domain event"
        );
        self.logged.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

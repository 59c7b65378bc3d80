use super::notification::NotificationBus;
use super::payment::{ChargeOutcome, PaymentStrategies, PaymentStrategy};
use super::validation::{ValidationChain, ValidationContext};
use crate::config::PipelineConfig;
use crate::domain::campaign::{Campaign, CampaignPatch};
use crate::domain::donation::{DonationRecord, DonationRequest, PaymentMethod};
use crate::domain::events::DomainEvent;
use crate::domain::money::Amount;
use crate::domain::ports::RepositoryBox;
use crate::domain::user::User;
use crate::error::{
    PaymentError, PipelineError, StorageError, SubmissionError, ValidationError, ValidationErrorKind,
};
use crate::infrastructure::resource_manager::ResourceManager;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Where a submission ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Validated,
    Charged,
    Persisted,
    Notified,
    Rejected,
    ChargeFailed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Charged => "charged",
            Self::Persisted => "persisted",
            Self::Notified => "notified",
            Self::Rejected => "rejected",
            Self::ChargeFailed => "charge_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Completed,
    Rejected,
    ChargeFailed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::ChargeFailed => "charge_failed",
        })
    }
}

/// What `submit_donation` hands back to its caller.
///
/// Validation and payment failures are reported here; only storage failures
/// escape as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub struct DonationOutcome {
    pub status: OutcomeStatus,
    pub stage: PipelineStage,
    pub donation_id: Option<String>,
    pub transaction_id: Option<String>,
    pub receipt_id: Option<String>,
    /// Set when this donation pushed its campaign over the goal.
    pub goal_reached: bool,
    pub error: Option<SubmissionError>,
}

impl DonationOutcome {
    fn rejected(error: ValidationError) -> Self {
        Self {
            status: OutcomeStatus::Rejected,
            stage: PipelineStage::Rejected,
            donation_id: None,
            transaction_id: None,
            receipt_id: None,
            goal_reached: false,
            error: Some(error.into()),
        }
    }

    fn charge_failed(record: &DonationRecord, error: PaymentError) -> Self {
        Self {
            status: OutcomeStatus::ChargeFailed,
            stage: PipelineStage::ChargeFailed,
            donation_id: Some(record.donation_id.clone()),
            transaction_id: record.transaction_id.clone(),
            receipt_id: None,
            goal_reached: false,
            error: Some(error.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }
}

/// Validates, charges, persists and announces donations.
///
/// Holds no per-request state, so one instance (or its clones) can serve
/// any number of concurrent submissions.
#[derive(Clone)]
pub struct DonationPipeline {
    config: Arc<PipelineConfig>,
    chain: ValidationChain,
    strategies: PaymentStrategies,
    campaigns: RepositoryBox<Campaign>,
    donations: RepositoryBox<DonationRecord>,
    users: RepositoryBox<User>,
    bus: NotificationBus,
}

/// Assembles a [`DonationPipeline`]; anything not set falls back to what the
/// config implies.
pub struct PipelineBuilder {
    config: PipelineConfig,
    resources: ResourceManager,
    bus: Option<NotificationBus>,
    strategies: Option<PaymentStrategies>,
    chain: Option<ValidationChain>,
    chain_edits: Vec<Box<dyn FnOnce(&mut ValidationChain)>>,
}

impl PipelineBuilder {
    pub fn bus(mut self, bus: NotificationBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn strategies(mut self, strategies: PaymentStrategies) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Replaces the standard chain outright.
    pub fn chain(mut self, chain: ValidationChain) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Adjusts whichever chain ends up being used.
    pub fn edit_chain(mut self, edit: impl FnOnce(&mut ValidationChain) + 'static) -> Self {
        self.chain_edits.push(Box::new(edit));
        self
    }

    pub fn build(self) -> DonationPipeline {
        let strategies = self
            .strategies
            .unwrap_or_else(|| PaymentStrategies::from_config(&self.config));
        let mut chain = self
            .chain
            .unwrap_or_else(|| ValidationChain::standard(&self.config, &strategies));
        for edit in self.chain_edits {
            edit(&mut chain);
        }

        tracing::debug!(
            backend = self.resources.backend_name(),
            checks = ?chain.names(),
            methods = ?strategies.available_methods(),
            "donation pipeline ready"
        );

        DonationPipeline {
            config: Arc::new(self.config),
            chain,
            strategies,
            campaigns: self.resources.campaigns(),
            donations: self.resources.donations(),
            users: self.resources.users(),
            bus: self.bus.unwrap_or_default(),
        }
    }
}

impl DonationPipeline {
    pub fn new(config: PipelineConfig, resources: &ResourceManager, bus: NotificationBus) -> Self {
        Self::builder(config, resources).bus(bus).build()
    }

    pub fn builder(config: PipelineConfig, resources: &ResourceManager) -> PipelineBuilder {
        PipelineBuilder {
            config,
            resources: resources.clone(),
            bus: None,
            strategies: None,
            chain: None,
            chain_edits: Vec::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Runs one request through the whole pipeline.
    ///
    /// Rejections and declined charges come back as an `Ok` outcome. A
    /// `StorageError` means the backend failed; by then the charge may
    /// already have gone through, so retrying is left to the caller.
    pub async fn submit_donation(&self, request: DonationRequest) -> Result<DonationOutcome, StorageError> {
        let span = tracing::info_span!(
            "submit_donation",
            campaign = %request.campaign_id,
            method = %request.payment_method,
        );
        self.process(request).instrument(span).await
    }

    /// [`submit_donation`](Self::submit_donation) bounded by `limit`.
    ///
    /// The submission runs on its own task and is not cancelled when the
    /// limit expires: a `TimedOut` error does not mean the donation was not
    /// charged or recorded.
    pub async fn submit_with_timeout(
        &self,
        request: DonationRequest,
        limit: Duration,
    ) -> Result<DonationOutcome, PipelineError> {
        let pipeline = self.clone();
        let task = tokio::spawn(async move { pipeline.submit_donation(request).await });
        match tokio::time::timeout(limit, task).await {
            Err(_) => Err(PipelineError::TimedOut(limit)),
            Ok(Ok(outcome)) => Ok(outcome?),
            Ok(Err(join)) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
            Ok(Err(join)) => Err(StorageError::Backend(join.to_string()).into()),
        }
    }

    async fn process(&self, request: DonationRequest) -> Result<DonationOutcome, StorageError> {
        // Received -> Validated
        let campaign = self.campaigns.find_by_id(&request.campaign_id).await?;
        let donor = match &request.donor_id {
            Some(id) => self.users.find_by_id(id).await?,
            None => None,
        };
        let ctx = ValidationContext::new(&request, campaign.as_ref()).with_donor(donor.as_ref());
        let (amount, method, strategy) = match self
            .chain
            .validate(&ctx)
            .and_then(|()| self.select(&request))
        {
            Ok(selected) => selected,
            Err(err) => {
                tracing::warn!(kind = %err.kind, field = %err.field, reason = %err.reason, "donation rejected");
                return Ok(DonationOutcome::rejected(err));
            }
        };

        // Validated -> Charged | ChargeFailed
        let mut record = DonationRecord::pending(&request, amount, method);
        let charge = match strategy.charge(amount, &request.payment_details).await {
            Ok(charge) if charge.succeeded => charge,
            declined => return self.record_failure(record, declined).await,
        };
        record.complete(charge.transaction_id.clone(), charge.fee)?;
        tracing::debug!(
            donation_id = %record.donation_id,
            source = %charge.masked_source,
            fee = %charge.fee,
            "charge accepted"
        );

        // Charged -> Persisted
        self.donations.create(record.clone()).await?;
        let credited = self
            .campaigns
            .update(
                &record.campaign_id,
                CampaignPatch::credit(amount, record.donation_id.clone()),
            )
            .await?
            .ok_or_else(|| StorageError::Missing {
                collection: "campaigns",
                id: record.campaign_id.clone(),
            })?;
        // the credit completes the campaign in the same write that marks it
        let goal_reached = credited.completed_by.as_deref() == Some(record.donation_id.as_str());

        // Persisted -> Notified
        let outcome = DonationOutcome {
            status: OutcomeStatus::Completed,
            stage: PipelineStage::Notified,
            donation_id: Some(record.donation_id.clone()),
            transaction_id: record.transaction_id.clone(),
            receipt_id: record.receipt_id.clone(),
            goal_reached,
            error: None,
        };
        tracing::info!(
            donation_id = %record.donation_id,
            amount = %amount,
            raised = %credited.current_amount,
            goal_reached,
            "donation completed"
        );
        self.bus.publish(DomainEvent::DonationRecorded { record });
        if goal_reached {
            self.bus.publish(DomainEvent::CampaignGoalReached {
                campaign_id: credited.id.clone(),
                goal_amount: credited.goal_amount,
                current_amount: credited.current_amount,
            });
        }
        Ok(outcome)
    }

    /// Resolves amount and strategy once the chain has passed. The standard
    /// chain already guarantees both; a customised chain might not.
    fn select(
        &self,
        request: &DonationRequest,
    ) -> Result<(Amount, PaymentMethod, Arc<dyn PaymentStrategy>), ValidationError> {
        let amount = Amount::new(request.amount).map_err(|e| {
            ValidationError::new(ValidationErrorKind::InvalidAmount, "amount", e.to_string())
        })?;
        let strategy = self.strategies.resolve(&request.payment_method).ok_or_else(|| {
            ValidationError::new(
                ValidationErrorKind::UnsupportedPaymentMethod,
                "payment_method",
                format!("`{}` is not an accepted payment method", request.payment_method),
            )
        })?;
        Ok((amount, strategy.method(), strategy))
    }

    /// Persists a `Failed` record for a declined or unreachable charge.
    async fn record_failure(
        &self,
        mut record: DonationRecord,
        charge: Result<ChargeOutcome, PaymentError>,
    ) -> Result<DonationOutcome, StorageError> {
        let (transaction_id, error) = match charge {
            Ok(declined) => {
                let reason = declined
                    .failure_reason
                    .unwrap_or_else(|| "charge declined".to_string());
                (Some(declined.transaction_id), PaymentError::new(reason))
            }
            Err(err) => (None, err),
        };
        record.fail(transaction_id, error.reason.clone())?;
        self.donations.create(record.clone()).await?;
        tracing::warn!(
            donation_id = %record.donation_id,
            reason = %error.reason,
            "charge failed"
        );
        Ok(DonationOutcome::charge_failed(&record, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::campaign::CampaignStatus;
    use crate::domain::donation::{DonationStatus, PaymentDetails};
    use crate::domain::money::Balance;
    use crate::domain::ports::{FindQuery, Repository};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn paypal(campaign: &str, amount: Decimal) -> DonationRequest {
        DonationRequest {
            campaign_id: campaign.to_string(),
            donor_id: Some("d1".to_string()),
            amount,
            payment_method: "paypal".to_string(),
            payment_details: PaymentDetails::from([(
                "paypal_email".to_string(),
                "jo@example.com".to_string(),
            )]),
            anonymous: false,
            message: None,
        }
    }

    async fn setup(goal: Decimal) -> (ResourceManager, DonationPipeline) {
        let resources = ResourceManager::in_memory();
        resources
            .campaigns()
            .create(Campaign::new("c1", "Wells", goal))
            .await
            .unwrap();
        let pipeline = DonationPipeline::new(PipelineConfig::default(), &resources, NotificationBus::new());
        (resources, pipeline)
    }

    #[tokio::test]
    async fn test_completed_donation_credits_campaign() {
        let (resources, pipeline) = setup(dec!(100)).await;
        let outcome = pipeline.submit_donation(paypal("c1", dec!(40))).await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert_eq!(outcome.stage, PipelineStage::Notified);
        assert!(outcome.transaction_id.unwrap().starts_with("pp_"));
        assert!(!outcome.goal_reached);

        let campaign = resources.campaigns().find_by_id("c1").await.unwrap().unwrap();
        assert_eq!(campaign.current_amount, Balance(dec!(40)));
        assert_eq!(campaign.donation_count, 1);
        assert_eq!(campaign.status, CampaignStatus::Active);

        let record = resources
            .donations()
            .find_by_id(&outcome.donation_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, DonationStatus::Completed);
        assert_eq!(record.fee, dec!(1.46));
    }

    #[tokio::test]
    async fn test_goal_crossing_completes_campaign_once() {
        let (resources, pipeline) = setup(dec!(50)).await;
        let first = pipeline.submit_donation(paypal("c1", dec!(50))).await.unwrap();
        assert!(first.goal_reached);

        let campaign = resources.campaigns().find_by_id("c1").await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Completed);

        let late = pipeline.submit_donation(paypal("c1", dec!(5))).await.unwrap();
        assert_eq!(late.status, OutcomeStatus::Rejected);
        assert!(matches!(
            late.error,
            Some(SubmissionError::Validation(ValidationError {
                kind: ValidationErrorKind::CampaignNotAcceptingDonations,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn test_rejection_writes_nothing() {
        let (resources, pipeline) = setup(dec!(100)).await;
        let outcome = pipeline.submit_donation(paypal("c1", dec!(0))).await.unwrap();

        assert_eq!(outcome.stage, PipelineStage::Rejected);
        assert_eq!(outcome.donation_id, None);
        assert_eq!(resources.donations().count(FindQuery::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_declined_charge_is_persisted_as_failed() {
        let (resources, pipeline) = setup(dec!(100)).await;
        let mut request = paypal("c1", dec!(10));
        request
            .payment_details
            .insert("paypal_email".to_string(), "decline@example.com".to_string());

        let outcome = pipeline.submit_donation(request).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::ChargeFailed);
        assert!(matches!(outcome.error, Some(SubmissionError::Payment(_))));

        let record = resources
            .donations()
            .find_by_id(&outcome.donation_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, DonationStatus::Failed);
        assert_eq!(record.transaction_id, outcome.transaction_id);

        let campaign = resources.campaigns().find_by_id("c1").await.unwrap().unwrap();
        assert_eq!(campaign.current_amount, Balance::ZERO);
    }

    #[tokio::test]
    async fn test_timeout_wrapper_passes_outcome_through() {
        let (_resources, pipeline) = setup(dec!(100)).await;
        let outcome = pipeline
            .submit_with_timeout(paypal("c1", dec!(10)), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(outcome.is_completed());
    }
}

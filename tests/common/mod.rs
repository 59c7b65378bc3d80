#![allow(dead_code)]

use async_trait::async_trait;
use donation_pipeline::application::notification::{EventHandler, NotificationBus};
use donation_pipeline::application::pipeline::DonationPipeline;
use donation_pipeline::config::PipelineConfig;
use donation_pipeline::domain::campaign::Campaign;
use donation_pipeline::domain::donation::{DonationRequest, PaymentDetails};
use donation_pipeline::domain::events::{DomainEvent, EventKind};
use donation_pipeline::domain::ports::{Mutation, Repository, StorageBackend};
use donation_pipeline::error::{NotificationError, StorageError};
use donation_pipeline::infrastructure::in_memory::InMemoryBackend;
use donation_pipeline::infrastructure::resource_manager::ResourceManager;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const VALID_CARD: &str = "4242424242424242";

fn details(pairs: &[(&str, &str)]) -> PaymentDetails {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub fn card_request(campaign: &str, amount: Decimal, card_number: &str) -> DonationRequest {
    DonationRequest {
        campaign_id: campaign.to_string(),
        donor_id: Some("donor-1".to_string()),
        amount,
        payment_method: "credit_card".to_string(),
        payment_details: details(&[
            ("card_number", card_number),
            ("cvv", "123"),
            ("expiry_month", "12"),
            ("expiry_year", "2099"),
        ]),
        anonymous: false,
        message: None,
    }
}

pub fn paypal_request(campaign: &str, amount: Decimal) -> DonationRequest {
    DonationRequest {
        campaign_id: campaign.to_string(),
        donor_id: None,
        amount,
        payment_method: "paypal".to_string(),
        payment_details: details(&[("paypal_email", "jo@example.com")]),
        anonymous: true,
        message: None,
    }
}

/// In-memory backend that counts every write it receives.
#[derive(Default)]
pub struct CountingBackend {
    inner: InMemoryBackend,
    pub inserts: AtomicUsize,
    pub modifies: AtomicUsize,
    pub removes: AtomicUsize,
}

impl CountingBackend {
    pub fn writes(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
            + self.modifies.load(Ordering::SeqCst)
            + self.removes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for CountingBackend {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn insert(&self, collection: &'static str, id: &str, doc: Vec<u8>) -> Result<bool, StorageError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(collection, id, doc).await
    }

    async fn get(&self, collection: &'static str, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(collection, id).await
    }

    async fn remove(&self, collection: &'static str, id: &str) -> Result<bool, StorageError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(collection, id).await
    }

    async fn scan(&self, collection: &'static str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        self.inner.scan(collection).await
    }

    async fn modify(
        &self,
        collection: &'static str,
        id: &str,
        mutate: Mutation<'_>,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        self.modifies.fetch_add(1, Ordering::SeqCst);
        self.inner.modify(collection, id, mutate).await
    }
}

/// In-memory backend whose writes can be switched to fail.
#[derive(Default)]
pub struct FailingBackend {
    inner: InMemoryBackend,
    pub fail_inserts: AtomicBool,
    pub fail_modifies: AtomicBool,
}

impl FailingBackend {
    fn outage() -> StorageError {
        StorageError::Backend("down".to_string())
    }
}

#[async_trait]
impl StorageBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn insert(&self, collection: &'static str, id: &str, doc: Vec<u8>) -> Result<bool, StorageError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.insert(collection, id, doc).await
    }

    async fn get(&self, collection: &'static str, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(collection, id).await
    }

    async fn remove(&self, collection: &'static str, id: &str) -> Result<bool, StorageError> {
        self.inner.remove(collection, id).await
    }

    async fn scan(&self, collection: &'static str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        self.inner.scan(collection).await
    }

    async fn modify(
        &self,
        collection: &'static str,
        id: &str,
        mutate: Mutation<'_>,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        if self.fail_modifies.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.modify(collection, id, mutate).await
    }
}

/// Records every event it is handed.
#[derive(Default)]
pub struct RecordingHandler {
    pub events: Mutex<Vec<DomainEvent>>,
}

impl RecordingHandler {
    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn name(&self) -> &str {
        "recording"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), NotificationError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Subscribes a fresh [`RecordingHandler`] to both event kinds.
pub fn record_events(bus: &NotificationBus) -> (Arc<RecordingHandler>, Arc<dyn EventHandler>) {
    let recorder = Arc::new(RecordingHandler::default());
    let handler: Arc<dyn EventHandler> = recorder.clone();
    bus.subscribe(EventKind::DonationRecorded, &handler);
    bus.subscribe(EventKind::CampaignGoalReached, &handler);
    (recorder, handler)
}

pub struct Harness {
    pub resources: ResourceManager,
    pub backend: Arc<CountingBackend>,
    pub bus: NotificationBus,
    pub pipeline: DonationPipeline,
}

/// Pipeline over a counting in-memory backend seeded with `campaigns`.
pub async fn harness(campaigns: Vec<Campaign>) -> Harness {
    let backend = Arc::new(CountingBackend::default());
    let resources = ResourceManager::from_handle(backend.clone());
    let repository = resources.campaigns();
    for campaign in campaigns {
        repository.create(campaign).await.unwrap();
    }
    // seeding is not part of what tests measure
    backend.inserts.store(0, Ordering::SeqCst);

    let bus = NotificationBus::new();
    let pipeline = DonationPipeline::new(PipelineConfig::default(), &resources, bus.clone());
    Harness {
        resources,
        backend,
        bus,
        pipeline,
    }
}

pub fn write_campaigns_csv(path: &Path, rows: &[(&str, &str)]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["id", "title", "goal_amount", "current_amount", "deadline", "status"])?;
    for (id, goal) in rows {
        wtr.write_record([*id, *id, *goal, "0", "", "active"])?;
    }
    wtr.flush()?;
    Ok(())
}

/// `rows` PayPal donations of `amount` each against `campaign`.
pub fn generate_requests_csv(path: &Path, campaign: &str, rows: usize, amount: &str) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["campaign_id", "donor_id", "amount", "method", "anonymous", "message", "details"])?;
    for i in 1..=rows {
        wtr.write_record([
            campaign,
            format!("donor-{i}").as_str(),
            amount,
            "paypal",
            "false",
            "",
            "paypal_email=jo@example.com",
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

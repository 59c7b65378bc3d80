use clap::Parser;
use donation_pipeline::application::notification::{EventHandler, NotificationBus};
use donation_pipeline::application::pipeline::{DonationOutcome, DonationPipeline};
use donation_pipeline::application::subscribers::{AnalyticsSubscriber, AuditLogSubscriber};
use donation_pipeline::config::PipelineConfig;
use donation_pipeline::domain::campaign::Campaign;
use donation_pipeline::domain::events::EventKind;
use donation_pipeline::domain::ports::{FindQuery, Repository};
use donation_pipeline::infrastructure::resource_manager::ResourceManager;
use donation_pipeline::interfaces::csv::campaign_reader::CampaignReader;
use donation_pipeline::interfaces::csv::donation_reader::DonationReader;
use donation_pipeline::interfaces::csv::summary_writer::{OutcomeWriter, SummaryWriter};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Donation requests CSV file
    input: PathBuf,

    /// Campaigns CSV file the run starts from
    #[arg(long)]
    campaigns: PathBuf,

    /// JSON pipeline configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Overrides `max_donation_amount` from the configuration
    #[arg(long)]
    max_amount: Option<Decimal>,

    /// Writes one outcome row per request to this CSV file
    #[arg(long)]
    outcomes: Option<PathBuf>,

    /// Maximum number of submissions in flight
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(cli.config.as_deref()).into_diagnostic()?;
    if let Some(max) = cli.max_amount {
        config.max_donation_amount = max;
    }
    config.validate().into_diagnostic()?;
    Ok(config)
}

#[cfg(feature = "storage-rocksdb")]
fn open_resources(db_path: Option<&Path>) -> Result<ResourceManager> {
    match db_path {
        Some(path) => ResourceManager::open_rocksdb(path).into_diagnostic(),
        None => Ok(ResourceManager::in_memory()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_resources(db_path: Option<&Path>) -> Result<ResourceManager> {
    if db_path.is_some() {
        tracing::warn!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(ResourceManager::in_memory())
}

/// Loads the campaigns file. Campaigns already in storage keep their stored
/// totals so a persistent run picks up where the last one stopped.
async fn seed_campaigns(resources: &ResourceManager, path: &Path) -> Result<()> {
    let repository = resources.campaigns();
    let file = File::open(path).into_diagnostic()?;
    for campaign in CampaignReader::new(file).campaigns() {
        match campaign {
            Ok(campaign) => {
                if repository.find_by_id(&campaign.id).await.into_diagnostic()?.is_none() {
                    repository.create(campaign).await.into_diagnostic()?;
                }
            }
            Err(e) => tracing::warn!(error = %e, "skipping campaign row"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let resources = open_resources(cli.db_path.as_deref())?;
    tracing::info!(backend = resources.backend_name(), "storage ready");
    seed_campaigns(&resources, &cli.campaigns).await?;

    let bus = NotificationBus::new();
    let analytics = Arc::new(AnalyticsSubscriber::new());
    let audit: Arc<dyn EventHandler> = Arc::new(AuditLogSubscriber::new());
    let analytics_handler: Arc<dyn EventHandler> = analytics.clone();
    for kind in [EventKind::DonationRecorded, EventKind::CampaignGoalReached] {
        bus.subscribe(kind, &analytics_handler);
        bus.subscribe(kind, &audit);
    }

    let pipeline = DonationPipeline::new(config, &resources, bus.clone());

    // Submit requests concurrently
    let permits = Arc::new(Semaphore::new(cli.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let file = File::open(&cli.input).into_diagnostic()?;
    for (index, request) in DonationReader::new(file).requests().enumerate() {
        // header is line 1
        let line = index + 2;
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(line, error = %e, "skipping request row");
                continue;
            }
        };
        let permit = permits.clone().acquire_owned().await.into_diagnostic()?;
        let pipeline = pipeline.clone();
        tasks.spawn(async move {
            let outcome = pipeline.submit_donation(request).await;
            drop(permit);
            (line, outcome)
        });
    }

    let mut outcomes: Vec<(usize, DonationOutcome)> = Vec::new();
    let mut storage_failures = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined.into_diagnostic()? {
            (line, Ok(outcome)) => outcomes.push((line, outcome)),
            (line, Err(e)) => {
                storage_failures += 1;
                tracing::error!(line, error = %e, "submission aborted by storage failure");
            }
        }
    }
    bus.wait_idle().await;

    if let Some(path) = &cli.outcomes {
        outcomes.sort_by_key(|(line, _)| *line);
        let mut writer = OutcomeWriter::new(File::create(path).into_diagnostic()?);
        for (line, outcome) in &outcomes {
            writer.write_outcome(*line, outcome).into_diagnostic()?;
        }
        writer.flush().into_diagnostic()?;
    }

    let stats = analytics.snapshot();
    tracing::info!(
        submitted = outcomes.len(),
        completed = stats.donations,
        raised = %stats.total_raised,
        fees = %stats.total_fees,
        goals_reached = stats.goals_reached.len(),
        "run finished"
    );

    // Output final campaign state
    let campaigns = resources
        .campaigns()
        .find_all(FindQuery::<Campaign>::all().sort_by(|a, b| a.id.cmp(&b.id)))
        .await
        .into_diagnostic()?
        .collect::<std::result::Result<Vec<_>, _>>()
        .into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = SummaryWriter::new(stdout.lock());
    writer.write_campaigns(&campaigns).into_diagnostic()?;

    if storage_failures > 0 {
        miette::bail!("{storage_failures} submission(s) failed with storage errors");
    }
    Ok(())
}

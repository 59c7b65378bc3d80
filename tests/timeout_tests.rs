mod common;

use async_trait::async_trait;
use common::paypal_request;
use donation_pipeline::application::payment::{ChargeOutcome, PaymentStrategies, PaymentStrategy};
use donation_pipeline::application::pipeline::DonationPipeline;
use donation_pipeline::config::PipelineConfig;
use donation_pipeline::domain::campaign::Campaign;
use donation_pipeline::domain::donation::{PaymentDetails, PaymentMethod};
use donation_pipeline::domain::money::{Amount, Balance};
use donation_pipeline::domain::ports::{FindQuery, Repository};
use donation_pipeline::error::{PaymentError, PipelineError, ValidationResult};
use donation_pipeline::infrastructure::resource_manager::ResourceManager;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

/// PayPal stand-in whose processor takes a while to answer.
struct SlowProcessor;

#[async_trait]
impl PaymentStrategy for SlowProcessor {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::PayPal
    }

    fn display_name(&self) -> &'static str {
        "Slow PayPal"
    }

    fn validate_details(&self, _details: &PaymentDetails) -> ValidationResult {
        Ok(())
    }

    async fn charge(&self, _amount: Amount, _details: &PaymentDetails) -> Result<ChargeOutcome, PaymentError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(ChargeOutcome {
            transaction_id: "pp_slow0001".to_string(),
            succeeded: true,
            fee: Decimal::ZERO,
            masked_source: "***".to_string(),
            failure_reason: None,
        })
    }
}

#[tokio::test]
async fn test_timed_out_submission_still_completes() {
    let resources = ResourceManager::in_memory();
    resources
        .campaigns()
        .create(Campaign::new("C1", "Food bank", dec!(1000)))
        .await
        .unwrap();
    let mut strategies = PaymentStrategies::empty();
    strategies.register(Arc::new(SlowProcessor));
    let pipeline = DonationPipeline::builder(PipelineConfig::default(), &resources)
        .strategies(strategies)
        .build();

    let result = pipeline
        .submit_with_timeout(paypal_request("C1", dec!(40)), Duration::from_millis(20))
        .await;
    assert!(matches!(result, Err(PipelineError::TimedOut(_))));

    // the caller gave up; the donation did not
    tokio::time::sleep(Duration::from_millis(800)).await;
    let campaign = resources.campaigns().find_by_id("C1").await.unwrap().unwrap();
    assert_eq!(campaign.current_amount, Balance::new(dec!(40)));
    assert_eq!(resources.donations().count(FindQuery::all()).await.unwrap(), 1);
}

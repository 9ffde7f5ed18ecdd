//! LeadFlow - Campaign dispatch server entry point

use anyhow::Result;
use leadflow_common::config::Config;
use leadflow_core::{
    DispatchMetrics, DispatchWorker, FeedbackAggregator, FeedbackWorker, PgDeliveryQueue,
    PgVerificationQueue, StoreReputationService,
};
use leadflow_storage::db::DatabasePool;
use leadflow_storage::repository::{
    DbCampaignRepository, DbDeliveryEventRepository, DbLeadRepository,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting LeadFlow campaign server...");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;

    // Run migrations
    db_pool.migrate().await?;

    // Repositories
    let campaigns = Arc::new(DbCampaignRepository::new(db_pool.clone()));
    let leads = Arc::new(DbLeadRepository::new(db_pool.clone()));
    let events = Arc::new(DbDeliveryEventRepository::new(db_pool.clone()));

    // Queues
    let delivery_queue = Arc::new(PgDeliveryQueue::new(db_pool.clone()));
    let verification_queue = Arc::new(PgVerificationQueue::new(db_pool.clone()));

    // Metrics
    let registry = prometheus::Registry::new();
    let metrics = DispatchMetrics::new();
    metrics.register(&registry)?;

    // Reputation service
    let reputation = Arc::new(StoreReputationService::new(
        campaigns.clone(),
        config.reputation.clone(),
    ));

    // Start dispatch worker
    let dispatch_handle = {
        let worker = DispatchWorker::new(
            campaigns.clone(),
            leads.clone(),
            delivery_queue,
            verification_queue,
        )
        .with_poll_interval(Duration::from_secs(config.dispatch.tick_secs))
        .with_campaign_budget(Duration::from_millis(config.dispatch.campaign_budget_ms))
        .with_metrics(metrics.clone());

        tokio::spawn(async move {
            worker.run().await;
        })
    };

    // Start feedback worker
    let feedback_handle = {
        let aggregator = FeedbackAggregator::new(campaigns.clone(), leads.clone(), reputation)
            .with_metrics(metrics.clone());
        let worker = FeedbackWorker::new(events, aggregator)
            .with_poll_interval(Duration::from_secs(config.feedback.tick_secs))
            .with_batch_size(config.feedback.batch_size);

        tokio::spawn(async move {
            worker.run().await;
        })
    };

    info!("LeadFlow server started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Cleanup
    dispatch_handle.abort();
    feedback_handle.abort();

    info!("LeadFlow server shutdown complete");

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,leadflow=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}

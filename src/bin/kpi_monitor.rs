//! KPI monitor service
//!
//! Loads configuration, connects to PostgreSQL, starts the worker pool over
//! the durable job queue and the recurring breach check, then runs until
//! Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use kpi_monitor::config::ConfigManager;
use kpi_monitor::logging;
use kpi_monitor::messaging::{JobQueue, PgJobQueue};
use kpi_monitor::notification::BroadcastBreachPublisher;
use kpi_monitor::repository::PgIndicatorRepository;
use kpi_monitor::MonitoringSystem;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let manager = ConfigManager::load().context("failed to load configuration")?;
    info!(
        environment = %manager.environment(),
        config_directory = %manager.config_directory().display(),
        "Starting KPI monitor"
    );
    let config = manager.into_config();

    let repository = PgIndicatorRepository::connect(&config.database)
        .await
        .context("failed to connect to PostgreSQL")?;
    if config.database.run_migrations {
        repository
            .run_migrations()
            .await
            .context("failed to run migrations")?;
    }

    let publisher = Arc::new(BroadcastBreachPublisher::default());
    let mut breach_events = publisher.subscribe();
    tokio::spawn(async move {
        loop {
            match breach_events.recv().await {
                Ok(event) => info!(
                    indicator_id = %event.indicator_id,
                    code = %event.indicator_code,
                    level = %event.level,
                    deviation_pct = event.deviation_pct,
                    owner_id = %event.owner_id,
                    "{}", event.event_name
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Breach event log fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Jobs share the repository pool and outlive restarts
    let queue: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(
        repository.pool().clone(),
        config.queue.max_attempts,
        config.retention.clone(),
    ));
    let system =
        MonitoringSystem::bootstrap_with_queue(config, Arc::new(repository), publisher, queue)
            .context("failed to bootstrap monitoring system")?;
    system.start().context("failed to start monitoring system")?;

    info!("KPI monitor running, press Ctrl-C to stop");
    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutdown requested");
    system.shutdown().await;
    Ok(())
}

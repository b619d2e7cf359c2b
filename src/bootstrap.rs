//! # Monitoring System Bootstrap
//!
//! Builds every collaborator once, explicitly, and wires them together:
//! queue, breach processor, job handler, worker pool and scheduler. The
//! repository and notifier are supplied by the caller so tests can inject
//! in-memory fakes.

use std::sync::Arc;

use tracing::info;

use crate::config::KpiMonitorConfig;
use crate::errors::MonitorResult;
use crate::execution::{BreachJobHandler, WorkerPool, WorkerPoolConfig};
use crate::messaging::{InMemoryJobQueue, JobQueue, MonitoringJob};
use crate::notification::BreachNotifier;
use crate::orchestration::{BackoffCalculator, BreachProcessor, BreachProcessorConfig};
use crate::repository::IndicatorRepository;
use crate::scheduler::RecurringScheduler;

pub struct MonitoringSystem {
    config: KpiMonitorConfig,
    queue: Arc<dyn JobQueue>,
    processor: Arc<BreachProcessor>,
    handler: Arc<BreachJobHandler>,
    worker_pool: WorkerPool,
    scheduler: RecurringScheduler,
}

impl std::fmt::Debug for MonitoringSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringSystem")
            .field("worker_pool", &self.worker_pool)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl MonitoringSystem {
    /// Construct the system with the bundled in-memory job queue
    pub fn bootstrap(
        config: KpiMonitorConfig,
        repository: Arc<dyn IndicatorRepository>,
        notifier: Arc<dyn BreachNotifier>,
    ) -> MonitorResult<Self> {
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new(
            config.queue.max_attempts,
            config.retention.clone(),
        ));
        Self::bootstrap_with_queue(config, repository, notifier, queue)
    }

    /// Construct the system over a caller-supplied queue such as
    /// [`crate::messaging::PgJobQueue`]
    pub fn bootstrap_with_queue(
        config: KpiMonitorConfig,
        repository: Arc<dyn IndicatorRepository>,
        notifier: Arc<dyn BreachNotifier>,
        queue: Arc<dyn JobQueue>,
    ) -> MonitorResult<Self> {
        config.validate()?;

        let processor = Arc::new(BreachProcessor::new(
            repository.clone(),
            notifier,
            BreachProcessorConfig::from(&config),
        ));
        let handler = Arc::new(BreachJobHandler::new(processor.clone()));
        let worker_pool = WorkerPool::new(
            queue.clone(),
            handler.clone(),
            BackoffCalculator::new(config.backoff.clone()),
            WorkerPoolConfig::from(&config),
        );
        let scheduler = RecurringScheduler::new(queue.clone());

        info!(
            backend = repository.backend_name(),
            worker_count = config.queue.worker_count,
            interval_seconds = config.scheduler.interval_seconds,
            "Monitoring system bootstrapped"
        );

        Ok(Self {
            config,
            queue,
            processor,
            handler,
            worker_pool,
            scheduler,
        })
    }

    /// Start the workers and, when enabled, the recurring check-all timer
    pub fn start(&self) -> MonitorResult<()> {
        self.worker_pool.start();

        if self.config.scheduler.enabled {
            self.scheduler.register_recurring(
                self.config.scheduler.job_id.clone(),
                self.config.scheduler.interval(),
                MonitoringJob::ProcessAll,
                self.config.scheduler.run_on_start,
            )?;
        }
        Ok(())
    }

    /// Stop scheduling, then let workers finish their current jobs
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();
        self.worker_pool.shutdown().await;
        info!("Monitoring system shut down");
    }

    pub fn config(&self) -> &KpiMonitorConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    pub fn processor(&self) -> &Arc<BreachProcessor> {
        &self.processor
    }

    pub fn handler(&self) -> &Arc<BreachJobHandler> {
        &self.handler
    }

    pub fn worker_pool(&self) -> &WorkerPool {
        &self.worker_pool
    }

    pub fn scheduler(&self) -> &RecurringScheduler {
        &self.scheduler
    }
}

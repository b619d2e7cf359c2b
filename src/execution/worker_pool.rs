//! # Worker Pool
//!
//! A fixed number of tokio workers pull jobs from the shared [`JobQueue`].
//! Each job runs to completion on one worker, bounded by the job timeout,
//! before that worker receives the next one.
//!
//! Settlement rules:
//!
//! - `Success` completes the job
//! - `Retryable` (including a timeout) reschedules with exponential backoff
//!   until `max_attempts` deliveries have been spent, then parks the job
//! - `Permanent` parks the job immediately

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::job_handler::JobHandler;
use crate::config::KpiMonitorConfig;
use crate::errors::{MonitorError, MonitorResult};
use crate::log_queue_worker;
use crate::messaging::{JobExecutionResult, JobQueue, QueueError, ReceivedJob};
use crate::metrics;
use crate::orchestration::BackoffCalculator;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
    pub job_timeout: Duration,
    pub max_attempts: u32,
}

impl From<&KpiMonitorConfig> for WorkerPoolConfig {
    fn from(config: &KpiMonitorConfig) -> Self {
        Self {
            worker_count: config.queue.worker_count.max(1),
            poll_interval: config.queue.poll_interval(),
            visibility_timeout: config.queue.visibility_timeout(),
            job_timeout: config.queue.job_timeout(),
            max_attempts: config.queue.max_attempts.max(1),
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from(&KpiMonitorConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolStats {
    pub processed: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub failed: u64,
    pub timed_out: u64,
}

/// Everything a worker task needs, cheap to clone per worker
#[derive(Clone)]
struct WorkerContext {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    backoff: BackoffCalculator,
    config: WorkerPoolConfig,
    stats: Arc<Mutex<WorkerPoolStats>>,
}

pub struct WorkerPool {
    context: WorkerContext,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.context.config)
            .field("running_workers", &self.handles.lock().len())
            .finish()
    }
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        backoff: BackoffCalculator,
        config: WorkerPoolConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            context: WorkerContext {
                queue,
                handler,
                backoff,
                config,
                stats: Arc::new(Mutex::new(WorkerPoolStats::default())),
            },
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.context.config
    }

    pub fn stats(&self) -> WorkerPoolStats {
        self.context.stats.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.handles.lock().is_empty()
    }

    /// Spawn the workers; calling it while already running is a no-op
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            debug!("Worker pool already running");
            return;
        }

        self.shutdown_tx.send_replace(false);
        for worker_index in 0..self.context.config.worker_count {
            let context = self.context.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                context.run_worker(worker_index, shutdown_rx).await;
            }));
        }

        info!(
            worker_count = self.context.config.worker_count,
            max_attempts = self.context.config.max_attempts,
            job_timeout_ms = self.context.config.job_timeout.as_millis() as u64,
            "Worker pool started"
        );
    }

    /// Signal shutdown and wait for every worker to finish its current job
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task terminated abnormally");
            }
        }
        info!("Worker pool stopped");
    }

    /// Receive and settle at most one job on the calling task
    ///
    /// Returns whether a job was available.
    pub async fn run_once(&self) -> MonitorResult<bool> {
        self.context.process_next().await
    }
}

impl WorkerContext {
    async fn run_worker(self, worker_index: usize, mut shutdown_rx: watch::Receiver<bool>) {
        debug!(worker_index, "Worker started");

        loop {
            let stopping = *shutdown_rx.borrow();
            if stopping {
                break;
            }

            let idle = match self.process_next().await {
                Ok(processed) => !processed,
                Err(e) => {
                    error!(worker_index, error = %e, "Failed to receive or settle job");
                    true
                }
            };

            if idle {
                let sender_dropped = tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => false,
                    changed = shutdown_rx.changed() => changed.is_err(),
                };
                if sender_dropped {
                    break;
                }
            }
        }

        debug!(worker_index, "Worker stopped");
    }

    async fn process_next(&self) -> MonitorResult<bool> {
        let Some(received) = self.queue.receive(self.config.visibility_timeout).await? else {
            return Ok(false);
        };

        let job_kind = received.envelope.job.kind_name();
        log_queue_worker!(
            debug,
            "JOB_RECEIVED",
            job_id: received.envelope.job_id,
            job: received.envelope.job,
            attempt: received.envelope.attempts
        );

        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.config.job_timeout,
            self.handler.handle(&received.envelope),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                self.stats.lock().timed_out += 1;
                warn!(
                    job_id = %received.envelope.job_id,
                    timeout_ms = self.config.job_timeout.as_millis() as u64,
                    "Job exceeded its execution timeout"
                );
                MonitorError::Timeout {
                    operation: format!("{job_kind} job"),
                    timeout: self.config.job_timeout,
                }
                .into()
            }
        };
        metrics::job_duration().record(started.elapsed().as_secs_f64() * 1000.0, &[]);

        let outcome = self.settle(&received, result).await;
        self.stats.lock().processed += 1;
        metrics::jobs_finished_total().add(1, &metrics::job_labels(job_kind, outcome));
        Ok(true)
    }

    /// Apply the typed result to the queue; returns the outcome label
    async fn settle(&self, received: &ReceivedJob, result: JobExecutionResult) -> &'static str {
        let envelope = &received.envelope;
        let receipt = &received.receipt;

        let (outcome, settled) = match result {
            JobExecutionResult::Success => {
                self.stats.lock().succeeded += 1;
                ("success", self.queue.complete(receipt).await)
            }
            JobExecutionResult::Retryable {
                reason,
                retry_after,
            } if envelope.attempts < self.config.max_attempts => {
                let backoff = self.backoff.calculate(envelope.attempts, retry_after);
                log_queue_worker!(
                    warn,
                    "JOB_RETRY_SCHEDULED",
                    job_id: envelope.job_id,
                    attempt: envelope.attempts,
                    max_attempts: self.config.max_attempts,
                    delay_ms: backoff.delay.as_millis() as u64,
                    reason: reason
                );
                self.stats.lock().retried += 1;
                ("retried", self.queue.retry(receipt, backoff.delay, reason).await)
            }
            JobExecutionResult::Retryable { reason, .. } => {
                let reason = format!(
                    "exhausted {} attempts, last error: {reason}",
                    envelope.attempts
                );
                error!(job_id = %envelope.job_id, reason = %reason, "Job parked as failed");
                self.stats.lock().failed += 1;
                ("failed", self.queue.fail(receipt, reason).await)
            }
            JobExecutionResult::Permanent { reason } => {
                error!(
                    job_id = %envelope.job_id,
                    reason = %reason,
                    "Job failed permanently, parked without retry"
                );
                self.stats.lock().failed += 1;
                ("failed", self.queue.fail(receipt, reason).await)
            }
        };

        match settled {
            Ok(()) => {}
            Err(QueueError::StaleReceipt { job_id }) => {
                // Visibility expired mid-run and another worker owns the job now
                warn!(job_id = %job_id, "Job was redelivered before it could be settled");
            }
            Err(e) => {
                error!(job_id = %envelope.job_id, error = %e, "Failed to settle job");
            }
        }

        outcome
    }
}

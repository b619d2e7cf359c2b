//! # Job Handlers
//!
//! Executes one dequeued job and reports a typed [`JobExecutionResult`].
//! [`BreachJobHandler`] dispatches the monitoring job union onto the breach
//! processor.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::log_queue_worker;
use crate::messaging::{JobEnvelope, JobExecutionResult, MonitoringJob};
use crate::models::{BatchSummary, IndicatorResult};
use crate::orchestration::BreachProcessor;

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, envelope: &JobEnvelope) -> JobExecutionResult;
}

#[derive(Debug)]
pub struct BreachJobHandler {
    processor: Arc<BreachProcessor>,
    last_summary: Mutex<Option<BatchSummary>>,
}

impl BreachJobHandler {
    pub fn new(processor: Arc<BreachProcessor>) -> Self {
        Self {
            processor,
            last_summary: Mutex::new(None),
        }
    }

    pub fn processor(&self) -> &Arc<BreachProcessor> {
        &self.processor
    }

    /// Summary of the most recent successful check-all cycle
    pub fn last_summary(&self) -> Option<BatchSummary> {
        self.last_summary.lock().clone()
    }

    fn log_single_result(envelope: &JobEnvelope, result: &Option<IndicatorResult>) {
        match result {
            Some(result) => log_queue_worker!(
                info,
                "PROCESS_ONE_BREACH",
                job_id: envelope.job_id,
                indicator_id: result.indicator_id,
                level: result.level,
                corrective_task: result.corrective_task
            ),
            None => log_queue_worker!(
                debug,
                "PROCESS_ONE_NO_BREACH",
                job_id: envelope.job_id,
                job: envelope.job
            ),
        }
    }
}

#[async_trait]
impl JobHandler for BreachJobHandler {
    async fn handle(&self, envelope: &JobEnvelope) -> JobExecutionResult {
        match &envelope.job {
            MonitoringJob::ProcessAll => match self.processor.process_all().await {
                Ok(summary) => {
                    info!(
                        job_id = %envelope.job_id,
                        cycle_id = %summary.cycle_id,
                        total_evaluated = summary.total_evaluated,
                        tasks_created = summary.tasks_created,
                        "Check-all job finished"
                    );
                    *self.last_summary.lock() = Some(summary);
                    JobExecutionResult::Success
                }
                Err(err) => err.into(),
            },
            MonitoringJob::ProcessOne { indicator_id } => {
                match self.processor.process_one(*indicator_id).await {
                    Ok(result) => {
                        Self::log_single_result(envelope, &result);
                        JobExecutionResult::Success
                    }
                    Err(err) => err.into(),
                }
            }
        }
    }
}

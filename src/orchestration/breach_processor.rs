//! # Breach Processor
//!
//! Runs the per-indicator pipeline
//! `evaluate -> transition -> guard -> notify` for one or all eligible
//! indicators. Steps within one indicator are strictly sequential and run
//! under that indicator's lock against a fresh read of the definition;
//! indicators are processed independently and concurrently.
//!
//! The status write is a compare-and-set against the status the evaluation
//! read. An evaluation whose write is not applied never notifies: it stops
//! unless a concurrent evaluation already moved the indicator to the same
//! status, in which case it only reports the shared corrective task.
//!
//! Breach events are owed until published. Delivery is recorded on the
//! indicator after a successful publish, so a failed publish or a pipeline
//! error before it is retried by the next evaluation.
//!
//! Failure isolation: inside [`BreachProcessor::process_all`] an indicator
//! whose pipeline fails is recorded in the summary with its error and the
//! cycle carries on. Only a failed listing call (or every indicator failing
//! transiently, which means the backend is down) fails the cycle.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use opentelemetry::KeyValue;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::config::KpiMonitorConfig;
use crate::constants::status_groups;
use crate::errors::{MonitorError, MonitorResult};
use crate::evaluation::ThresholdEvaluator;
use crate::log_indicator;
use crate::metrics;
use crate::models::{
    BatchSummary, BreachEvent, BreachLevel, BreachVerdict, CorrectiveTaskResult, CurrentBreach,
    IndicatorDefinition, IndicatorResult,
};
use crate::notification::BreachNotifier;
use crate::orchestration::idempotency_guard::IdempotencyGuard;
use crate::orchestration::indicator_locks::IndicatorLocks;
use crate::repository::IndicatorRepository;
use crate::state_machine::HealthTransition;

#[derive(Debug, Clone, PartialEq)]
pub struct BreachProcessorConfig {
    pub indicator_concurrency: usize,
    pub corrective_due_in_days: i64,
}

impl Default for BreachProcessorConfig {
    fn default() -> Self {
        Self::from(&KpiMonitorConfig::default())
    }
}

impl From<&KpiMonitorConfig> for BreachProcessorConfig {
    fn from(config: &KpiMonitorConfig) -> Self {
        Self {
            indicator_concurrency: config.processing.indicator_concurrency.max(1),
            corrective_due_in_days: config.corrective_action.due_in_days,
        }
    }
}

pub struct BreachProcessor {
    repository: Arc<dyn IndicatorRepository>,
    notifier: Arc<dyn BreachNotifier>,
    evaluator: ThresholdEvaluator,
    guard: IdempotencyGuard,
    locks: IndicatorLocks,
    config: BreachProcessorConfig,
}

impl std::fmt::Debug for BreachProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreachProcessor")
            .field("backend", &self.repository.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

impl BreachProcessor {
    pub fn new(
        repository: Arc<dyn IndicatorRepository>,
        notifier: Arc<dyn BreachNotifier>,
        config: BreachProcessorConfig,
    ) -> Self {
        let guard = IdempotencyGuard::new(repository.clone(), config.corrective_due_in_days);
        Self {
            repository,
            notifier,
            evaluator: ThresholdEvaluator::new(),
            guard,
            locks: IndicatorLocks::new(),
            config,
        }
    }

    pub fn config(&self) -> &BreachProcessorConfig {
        &self.config
    }

    /// Evaluate every eligible indicator and summarize the cycle
    #[instrument(skip(self), fields(cycle_id = tracing::field::Empty))]
    pub async fn process_all(&self) -> MonitorResult<BatchSummary> {
        let started = Instant::now();
        let cycle_id = Uuid::now_v7();
        tracing::Span::current().record("cycle_id", tracing::field::display(cycle_id));
        let mut summary = BatchSummary::new(cycle_id, Utc::now());

        let indicators: Vec<IndicatorDefinition> = self
            .repository
            .list_eligible_indicators()
            .await?
            .into_iter()
            .filter(IndicatorDefinition::is_evaluation_eligible)
            .collect();
        let eligible = indicators.len();

        log_indicator!(
            info,
            "CYCLE_STARTED",
            cycle_id: cycle_id,
            eligible: eligible,
            concurrency: self.config.indicator_concurrency
        );

        let outcomes: Vec<(IndicatorDefinition, MonitorResult<Option<IndicatorResult>>)> =
            stream::iter(indicators)
                .map(|indicator| async move {
                    let outcome = self.process_indicator(&indicator).await;
                    (indicator, outcome)
                })
                .buffer_unordered(self.config.indicator_concurrency)
                .collect()
                .await;

        let mut transient_failures = 0usize;
        for (indicator, outcome) in outcomes {
            match outcome {
                Ok(Some(result)) => summary.record(result),
                Ok(None) => {}
                Err(err) => {
                    if err.is_retryable() {
                        transient_failures += 1;
                    }
                    error!(
                        cycle_id = %cycle_id,
                        indicator_id = %indicator.indicator_id,
                        code = %indicator.code,
                        error = %err,
                        "Indicator pipeline failed, continuing with remaining indicators"
                    );
                    metrics::indicator_failures_total()
                        .add(1, &[KeyValue::new("error_category", err.category())]);
                    summary.record(failed_result(&indicator, &err));
                }
            }
        }

        summary.completed_at = Utc::now();
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::cycle_duration().record(duration_ms, &[]);

        if eligible > 0 && transient_failures == eligible {
            return Err(MonitorError::transient(
                "process_all",
                format!("all {eligible} eligible indicators failed with transient errors"),
            ));
        }

        log_indicator!(
            info,
            "CYCLE_COMPLETED",
            cycle_id: cycle_id,
            total_evaluated: summary.total_evaluated,
            total_breaches: summary.total_breaches,
            tasks_created: summary.tasks_created,
            tasks_duplicate: summary.tasks_duplicate,
            total_failed: summary.total_failed,
            duration_ms: duration_ms
        );

        Ok(summary)
    }

    /// Run the pipeline for a single indicator
    ///
    /// `Ok(None)` means nothing to report: the indicator is ineligible, has no
    /// data, is within thresholds (a recovery transition still applies in
    /// that case), or its status was changed elsewhere mid-evaluation.
    #[instrument(skip(self))]
    pub async fn process_one(&self, indicator_id: Uuid) -> MonitorResult<Option<IndicatorResult>> {
        let indicator = self
            .repository
            .get_indicator(indicator_id)
            .await?
            .ok_or(MonitorError::NotFound { indicator_id })?;

        if !indicator.is_evaluation_eligible() {
            debug!(
                indicator_id = %indicator_id,
                status = %indicator.status,
                "Indicator is not eligible for evaluation"
            );
            return Ok(None);
        }

        let result = self.process_indicator(&indicator).await?;
        Ok(result.filter(|result| result.level.is_breach()))
    }

    /// Indicators whose last evaluation left them at Warning or Critical
    pub async fn list_current_breaches(&self) -> MonitorResult<Vec<CurrentBreach>> {
        let indicators = self.repository.list_eligible_indicators().await?;
        Ok(indicators
            .into_iter()
            .filter(|indicator| status_groups::BREACH_STATES.contains(&indicator.status))
            .map(|indicator| CurrentBreach {
                level: indicator
                    .status
                    .reflected_level()
                    .unwrap_or(BreachLevel::None),
                indicator_id: indicator.indicator_id,
                code: indicator.code,
                name: indicator.name,
                status: indicator.status,
                steward_id: indicator.steward_id,
                since: indicator.updated_at,
            })
            .collect())
    }

    async fn process_indicator(
        &self,
        listed: &IndicatorDefinition,
    ) -> MonitorResult<Option<IndicatorResult>> {
        let indicator_id = listed.indicator_id;
        let _held = self.locks.acquire(indicator_id).await;

        // The listing may predate a status change or a publish by another run
        let Some(mut indicator) = self.repository.get_indicator(indicator_id).await? else {
            debug!(indicator_id = %indicator_id, "Indicator removed before evaluation");
            return Ok(None);
        };
        if !indicator.is_evaluation_eligible() {
            debug!(
                indicator_id = %indicator_id,
                status = %indicator.status,
                "Indicator left the eligible set before evaluation"
            );
            return Ok(None);
        }

        let latest = self.repository.get_latest_data_point(indicator_id).await?;
        let verdict = self
            .evaluator
            .evaluate(&indicator, latest.as_ref(), Utc::now());

        if !verdict.has_data() {
            debug!(indicator_id = %indicator_id, "No data points yet, skipping indicator");
            return Ok(None);
        }
        if verdict.deviation_pct.is_none() {
            return Ok(None);
        }

        metrics::evaluations_total().add(1, &[]);

        let transition = HealthTransition::compute(indicator_id, indicator.status, verdict.level)?;
        let mut lost_race = false;
        if transition.is_change() {
            let applied = self
                .repository
                .update_indicator_status(indicator_id, transition.from, transition.to)
                .await?;
            if applied {
                log_indicator!(
                    info,
                    "STATUS_TRANSITION",
                    indicator_id: indicator_id,
                    from: transition.from,
                    to: transition.to,
                    level: verdict.level
                );
            } else {
                let current = self.repository.get_indicator(indicator_id).await?;
                match current {
                    Some(current) if current.status == transition.to => {
                        debug!(
                            indicator_id = %indicator_id,
                            status = %current.status,
                            "Concurrent evaluation applied the same transition"
                        );
                        indicator = current;
                        lost_race = true;
                    }
                    current => {
                        log_indicator!(
                            warn,
                            "STATUS_TRANSITION_ABANDONED",
                            indicator_id: indicator_id,
                            expected: transition.from,
                            found: current.map(|c| c.status),
                            to: transition.to
                        );
                        return Ok(None);
                    }
                }
            }
        }

        if verdict.level.is_breach() {
            metrics::breaches_detected_total()
                .add(1, &[KeyValue::new("level", verdict.level.as_str())]);
        }

        let corrective_task = self
            .guard
            .ensure_corrective_task(&indicator, &verdict)
            .await?;
        if let Some(task) = &corrective_task {
            record_task_outcome(task);
        }

        let last_notified = indicator.last_notified_level;
        let notified = if lost_race {
            false
        } else if transition.should_notify(last_notified) {
            self.notify(&indicator, &verdict, &transition).await?
        } else {
            if transition.clears_notified_level(last_notified) {
                self.repository
                    .record_notified_level(indicator_id, BreachLevel::None)
                    .await?;
            }
            false
        };

        Ok(Some(IndicatorResult {
            indicator_id,
            code: indicator.code.clone(),
            previous_status: transition.from,
            new_status: transition.to,
            level: verdict.level,
            current_value: verdict.current_value,
            target_value: verdict.target_value,
            deviation_pct: verdict.deviation_pct,
            corrective_task,
            notified,
            error: None,
        }))
    }

    /// Publish the owed breach event and record its delivery
    ///
    /// A rejected publish never fails the pipeline; the event stays owed.
    async fn notify(
        &self,
        indicator: &IndicatorDefinition,
        verdict: &BreachVerdict,
        transition: &HealthTransition,
    ) -> MonitorResult<bool> {
        let previous_level = indicator.last_notified_level;
        let Some(event_name) = transition.event_name(previous_level) else {
            return Ok(false);
        };
        let event = BreachEvent {
            event_id: Uuid::now_v7(),
            event_name: event_name.to_string(),
            indicator_id: indicator.indicator_id,
            indicator_code: indicator.code.clone(),
            level: verdict.level,
            previous_level,
            current_value: verdict.current_value.unwrap_or_default(),
            target_value: verdict.target_value,
            deviation_pct: verdict.deviation_pct.unwrap_or_default(),
            owner_id: indicator.steward_id,
            detected_at: verdict.evaluated_at,
        };

        match self.notifier.publish(&event).await {
            Ok(()) => {
                self.repository
                    .record_notified_level(indicator.indicator_id, verdict.level)
                    .await?;
                Ok(true)
            }
            Err(err) => {
                warn!(
                    indicator_id = %indicator.indicator_id,
                    event_name = %event.event_name,
                    error = %err,
                    "Breach notification failed, will retry on next evaluation"
                );
                metrics::notification_failures_total().add(1, &[]);
                Ok(false)
            }
        }
    }
}

fn record_task_outcome(task: &CorrectiveTaskResult) {
    let outcome = if task.created {
        "created"
    } else if task.is_duplicate() {
        "duplicate"
    } else {
        "link_missing"
    };
    metrics::corrective_tasks_total().add(1, &[KeyValue::new("outcome", outcome)]);
}

fn failed_result(indicator: &IndicatorDefinition, err: &MonitorError) -> IndicatorResult {
    IndicatorResult {
        indicator_id: indicator.indicator_id,
        code: indicator.code.clone(),
        previous_status: indicator.status,
        new_status: indicator.status,
        level: BreachLevel::None,
        current_value: None,
        target_value: indicator.target_value,
        deviation_pct: None,
        corrective_task: None,
        notified: false,
        error: Some(err.to_string()),
    }
}

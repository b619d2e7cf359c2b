//! # In-Memory Indicator Repository
//!
//! Thread-safe repository for tests and local development.
//!
//! ## Features
//!
//! - **Open-Task Uniqueness**: inserts are checked and applied under one write
//!   lock, so a second open task for an indicator is reported as
//!   `UniqueViolation` exactly like the PostgreSQL partial unique index
//! - **Failure Injection**: transient failures per operation or per indicator
//! - **Latency Injection**: widens interleaving windows for concurrency tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use uuid::Uuid;

use super::errors::{RepositoryError, RepositoryResult};
use super::traits::{CreateTaskOutcome, IndicatorRepository};
use crate::models::{
    BreachLevel, CorrectiveActionTask, IndicatorDataPoint, IndicatorDefinition, NewCorrectiveTask,
};
use crate::state_machine::{CorrectiveTaskStatus, IndicatorStatus};

#[derive(Debug, Default)]
struct InMemoryState {
    indicators: HashMap<Uuid, IndicatorDefinition>,
    data_points: HashMap<Uuid, Vec<IndicatorDataPoint>>,
    tasks: Vec<CorrectiveActionTask>,
}

/// In-memory repository
#[derive(Debug)]
pub struct InMemoryIndicatorRepository {
    state: RwLock<InMemoryState>,
    /// When false the store accepts duplicate open tasks (a backend without
    /// a uniqueness constraint)
    enforce_open_task_uniqueness: bool,
    latency: Option<Duration>,
    /// operation name -> remaining injected failures
    injected_failures: DashMap<&'static str, usize>,
    failing_indicators: DashSet<Uuid>,
    status_writes: AtomicU64,
    create_attempts: AtomicU64,
}

impl Default for InMemoryIndicatorRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIndicatorRepository {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(InMemoryState::default()),
            enforce_open_task_uniqueness: true,
            latency: None,
            injected_failures: DashMap::new(),
            failing_indicators: DashSet::new(),
            status_writes: AtomicU64::new(0),
            create_attempts: AtomicU64::new(0),
        }
    }

    /// Store with no uniqueness constraint on open tasks
    pub fn without_uniqueness_constraint() -> Self {
        Self {
            enforce_open_task_uniqueness: false,
            ..Self::new()
        }
    }

    /// Sleep this long before every repository operation
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert_indicator(&self, indicator: IndicatorDefinition) {
        self.state
            .write()
            .indicators
            .insert(indicator.indicator_id, indicator);
    }

    /// Append a point; periods may not overlap an existing point
    pub fn insert_data_point(&self, point: IndicatorDataPoint) -> RepositoryResult<()> {
        let mut state = self.state.write();
        let points = state.data_points.entry(point.indicator_id).or_default();
        if points.iter().any(|existing| existing.overlaps(&point)) {
            return Err(RepositoryError::QueryFailed {
                operation: "insert_data_point",
                reason: format!(
                    "period {}..{} overlaps an existing point for indicator {}",
                    point.period_start, point.period_end, point.indicator_id
                ),
            });
        }
        points.push(point);
        Ok(())
    }

    pub fn indicator(&self, indicator_id: Uuid) -> Option<IndicatorDefinition> {
        self.state.read().indicators.get(&indicator_id).cloned()
    }

    pub fn tasks_for(&self, indicator_id: Uuid) -> Vec<CorrectiveActionTask> {
        self.state
            .read()
            .tasks
            .iter()
            .filter(|t| t.indicator_id == indicator_id)
            .cloned()
            .collect()
    }

    pub fn open_task_count(&self, indicator_id: Uuid) -> usize {
        self.state
            .read()
            .tasks
            .iter()
            .filter(|t| t.indicator_id == indicator_id && t.is_open())
            .count()
    }

    pub fn total_open_tasks(&self) -> usize {
        self.state.read().tasks.iter().filter(|t| t.is_open()).count()
    }

    /// External workflow change to a task (assignment, completion)
    pub fn set_task_status(&self, task_id: Uuid, status: CorrectiveTaskStatus) -> bool {
        let mut state = self.state.write();
        match state.tasks.iter_mut().find(|t| t.task_id == task_id) {
            Some(task) => {
                task.status = status;
                true
            }
            None => false,
        }
    }

    /// External status change, e.g. retiring an indicator
    pub fn set_indicator_status(&self, indicator_id: Uuid, status: IndicatorStatus) -> bool {
        let mut state = self.state.write();
        match state.indicators.get_mut(&indicator_id) {
            Some(indicator) => {
                indicator.status = status;
                indicator.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Fail the next `count` calls of `operation` with a transient error
    pub fn fail_next(&self, operation: &'static str, count: usize) {
        self.injected_failures.insert(operation, count);
    }

    /// Fail every per-indicator operation for `indicator_id`
    pub fn fail_indicator(&self, indicator_id: Uuid) {
        self.failing_indicators.insert(indicator_id);
    }

    pub fn heal_indicator(&self, indicator_id: Uuid) {
        self.failing_indicators.remove(&indicator_id);
    }

    pub fn status_writes(&self) -> u64 {
        self.status_writes.load(Ordering::Relaxed)
    }

    pub fn create_attempts(&self) -> u64 {
        self.create_attempts.load(Ordering::Relaxed)
    }

    async fn before(&self, operation: &'static str, indicator_id: Option<Uuid>) -> RepositoryResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(id) = indicator_id {
            if self.failing_indicators.contains(&id) {
                return Err(RepositoryError::unavailable(
                    operation,
                    format!("injected failure for indicator {id}"),
                ));
            }
        }

        let mut fail = false;
        if let Some(mut remaining) = self.injected_failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                fail = true;
            }
        }
        if fail {
            return Err(RepositoryError::unavailable(operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl IndicatorRepository for InMemoryIndicatorRepository {
    async fn list_eligible_indicators(&self) -> RepositoryResult<Vec<IndicatorDefinition>> {
        self.before("list_eligible_indicators", None).await?;
        let state = self.state.read();
        let mut indicators: Vec<IndicatorDefinition> = state
            .indicators
            .values()
            .filter(|i| i.is_evaluation_eligible())
            .cloned()
            .collect();
        indicators.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(indicators)
    }

    async fn get_indicator(
        &self,
        indicator_id: Uuid,
    ) -> RepositoryResult<Option<IndicatorDefinition>> {
        self.before("get_indicator", Some(indicator_id)).await?;
        Ok(self.state.read().indicators.get(&indicator_id).cloned())
    }

    async fn get_latest_data_point(
        &self,
        indicator_id: Uuid,
    ) -> RepositoryResult<Option<IndicatorDataPoint>> {
        self.before("get_latest_data_point", Some(indicator_id)).await?;
        let state = self.state.read();
        Ok(state.data_points.get(&indicator_id).and_then(|points| {
            points
                .iter()
                .max_by_key(|point| point.period_end)
                .cloned()
        }))
    }

    async fn update_indicator_status(
        &self,
        indicator_id: Uuid,
        expected: IndicatorStatus,
        new_status: IndicatorStatus,
    ) -> RepositoryResult<bool> {
        self.before("update_indicator_status", Some(indicator_id)).await?;
        let mut state = self.state.write();
        let Some(indicator) = state.indicators.get_mut(&indicator_id) else {
            return Ok(false);
        };
        if indicator.status != expected || !indicator.status.is_evaluation_eligible() {
            return Ok(false);
        }
        indicator.status = new_status;
        indicator.updated_at = Utc::now();
        self.status_writes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn record_notified_level(
        &self,
        indicator_id: Uuid,
        level: BreachLevel,
    ) -> RepositoryResult<()> {
        self.before("record_notified_level", Some(indicator_id)).await?;
        if let Some(indicator) = self.state.write().indicators.get_mut(&indicator_id) {
            indicator.last_notified_level = level;
        }
        Ok(())
    }

    async fn find_open_task(
        &self,
        indicator_id: Uuid,
    ) -> RepositoryResult<Option<CorrectiveActionTask>> {
        self.before("find_open_task", Some(indicator_id)).await?;
        let state = self.state.read();
        Ok(state
            .tasks
            .iter()
            .find(|t| t.indicator_id == indicator_id && t.is_open())
            .cloned())
    }

    async fn create_corrective_task(
        &self,
        task: NewCorrectiveTask,
    ) -> RepositoryResult<CreateTaskOutcome> {
        self.before("create_corrective_task", Some(task.indicator_id))
            .await?;
        self.create_attempts.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write();
        if self.enforce_open_task_uniqueness
            && state
                .tasks
                .iter()
                .any(|t| t.indicator_id == task.indicator_id && t.is_open())
        {
            return Ok(CreateTaskOutcome::UniqueViolation);
        }

        let created = task.into_task(Utc::now());
        state.tasks.push(created.clone());
        Ok(CreateTaskOutcome::Created(created))
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}

//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use kpi_monitor::models::{IndicatorDataPoint, IndicatorDefinition};
use kpi_monitor::notification::RecordingBreachNotifier;
use kpi_monitor::orchestration::{BreachProcessor, BreachProcessorConfig};
use kpi_monitor::repository::InMemoryIndicatorRepository;
use kpi_monitor::state_machine::IndicatorStatus;

/// Builder for test indicators; defaults to the on-time delivery indicator
/// (target 95, warning 8%, critical 15%) linked to one work container
pub struct IndicatorBuilder {
    code: String,
    target: f64,
    warning: Option<f64>,
    critical: Option<f64>,
    status: IndicatorStatus,
    linked: bool,
}

impl Default for IndicatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorBuilder {
    pub fn new() -> Self {
        Self {
            code: format!("OTD-{}", Uuid::now_v7().simple()),
            target: 95.0,
            warning: Some(8.0),
            critical: Some(15.0),
            status: IndicatorStatus::Active,
            linked: true,
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = code.to_string();
        self
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.target = target;
        self
    }

    pub fn with_status(mut self, status: IndicatorStatus) -> Self {
        self.status = status;
        self
    }

    pub fn without_link(mut self) -> Self {
        self.linked = false;
        self
    }

    pub fn build(self) -> IndicatorDefinition {
        let indicator = IndicatorDefinition::new(self.code, "On-time delivery", self.target)
            .with_thresholds(self.warning, self.critical)
            .with_status(self.status)
            .with_category("operations")
            .with_unit("%");
        if self.linked {
            indicator.with_linked_work_container(Uuid::now_v7())
        } else {
            indicator
        }
    }

    /// Build and insert into the repository
    pub fn insert(self, repository: &InMemoryIndicatorRepository) -> IndicatorDefinition {
        let indicator = self.build();
        repository.insert_indicator(indicator.clone());
        indicator
    }
}

/// Record a reading for the period ending `days_ago` days before now
pub fn record_value(
    repository: &InMemoryIndicatorRepository,
    indicator_id: Uuid,
    days_ago: i64,
    actual: f64,
) -> IndicatorDataPoint {
    let period_end = Utc::now() - Duration::days(days_ago);
    let point = IndicatorDataPoint::new(
        indicator_id,
        period_end - Duration::days(1),
        period_end,
        actual,
    );
    repository
        .insert_data_point(point.clone())
        .expect("data point periods must not overlap");
    point
}

pub struct Harness {
    pub repository: Arc<InMemoryIndicatorRepository>,
    pub notifier: Arc<RecordingBreachNotifier>,
    pub processor: BreachProcessor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_repository(InMemoryIndicatorRepository::new())
    }

    pub fn with_repository(repository: InMemoryIndicatorRepository) -> Self {
        let repository = Arc::new(repository);
        let notifier = Arc::new(RecordingBreachNotifier::new());
        let processor = BreachProcessor::new(
            repository.clone(),
            notifier.clone(),
            BreachProcessorConfig::default(),
        );
        Self {
            repository,
            notifier,
            processor,
        }
    }

    /// A second processor over the same store, standing in for another process
    pub fn second_processor(&self) -> BreachProcessor {
        BreachProcessor::new(
            self.repository.clone(),
            self.notifier.clone(),
            BreachProcessorConfig::default(),
        )
    }
}

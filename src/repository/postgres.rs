//! # PostgreSQL Indicator Repository
//!
//! `sqlx`-backed repository. Open-task uniqueness is enforced by the partial
//! unique index `idx_corrective_tasks_one_open_per_indicator`; an insert that
//! trips it is reported as [`CreateTaskOutcome::UniqueViolation`], which
//! collapses concurrent check-then-create races into a single winner.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use super::errors::{RepositoryError, RepositoryResult};
use super::traits::{CreateTaskOutcome, IndicatorRepository};
use crate::config::DatabaseConfig;
use crate::constants::system::OPEN_TASK_UNIQUE_INDEX;
use crate::models::{
    BreachLevel, CorrectiveActionTask, IndicatorDataPoint, IndicatorDefinition, NewCorrectiveTask,
};
use crate::state_machine::IndicatorStatus;

const INDICATOR_COLUMNS: &str = r#"
    indicator_id, code, name, category, target_value, unit,
    threshold_warning, threshold_critical, status, steward_id,
    linked_work_container_ids, last_notified_level, created_at, updated_at
"#;

const TASK_COLUMNS: &str = r#"
    task_id, indicator_id, work_container_id, status, priority,
    due_date, owner_id, created_at
"#;

#[derive(Debug, FromRow)]
struct IndicatorRow {
    indicator_id: Uuid,
    code: String,
    name: String,
    category: String,
    target_value: f64,
    unit: String,
    threshold_warning: Option<f64>,
    threshold_critical: Option<f64>,
    status: String,
    steward_id: Uuid,
    linked_work_container_ids: Vec<Uuid>,
    last_notified_level: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IndicatorRow {
    fn into_model(self, operation: &'static str) -> RepositoryResult<IndicatorDefinition> {
        let status = self
            .status
            .parse()
            .map_err(|_| RepositoryError::InvalidRowData {
                operation,
                field: "status",
                value: self.status.clone(),
            })?;
        let last_notified_level =
            self.last_notified_level
                .parse()
                .map_err(|_| RepositoryError::InvalidRowData {
                    operation,
                    field: "last_notified_level",
                    value: self.last_notified_level.clone(),
                })?;
        Ok(IndicatorDefinition {
            indicator_id: self.indicator_id,
            code: self.code,
            name: self.name,
            category: self.category,
            target_value: self.target_value,
            unit: self.unit,
            threshold_warning: self.threshold_warning,
            threshold_critical: self.threshold_critical,
            status,
            steward_id: self.steward_id,
            linked_work_container_ids: self.linked_work_container_ids,
            last_notified_level,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DataPointRow {
    data_point_id: Uuid,
    indicator_id: Uuid,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    actual_value: f64,
    collected_at: DateTime<Utc>,
    verification_status: String,
}

impl DataPointRow {
    fn into_model(self, operation: &'static str) -> RepositoryResult<IndicatorDataPoint> {
        let verification_status =
            self.verification_status
                .parse()
                .map_err(|_| RepositoryError::InvalidRowData {
                    operation,
                    field: "verification_status",
                    value: self.verification_status.clone(),
                })?;
        Ok(IndicatorDataPoint {
            data_point_id: self.data_point_id,
            indicator_id: self.indicator_id,
            period_start: self.period_start,
            period_end: self.period_end,
            actual_value: self.actual_value,
            collected_at: self.collected_at,
            verification_status,
        })
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    task_id: Uuid,
    indicator_id: Uuid,
    work_container_id: Uuid,
    status: String,
    priority: String,
    due_date: DateTime<Utc>,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_model(self, operation: &'static str) -> RepositoryResult<CorrectiveActionTask> {
        let status = self
            .status
            .parse()
            .map_err(|_| RepositoryError::InvalidRowData {
                operation,
                field: "status",
                value: self.status.clone(),
            })?;
        let priority = self
            .priority
            .parse()
            .map_err(|_| RepositoryError::InvalidRowData {
                operation,
                field: "priority",
                value: self.priority.clone(),
            })?;
        Ok(CorrectiveActionTask {
            task_id: self.task_id,
            indicator_id: self.indicator_id,
            work_container_id: self.work_container_id,
            status,
            priority,
            due_date: self.due_date,
            owner_id: self.owner_id,
            created_at: self.created_at,
        })
    }
}

/// PostgreSQL repository over a shared connection pool
#[derive(Debug, Clone)]
pub struct PgIndicatorRepository {
    pool: PgPool,
}

impl PgIndicatorRepository {
    /// Wrap an existing pool (BYOP - Bring Your Own Pool)
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> RepositoryResult<Self> {
        info!(
            max_connections = config.max_connections,
            "Connecting indicator repository to PostgreSQL"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.database_url())
            .await
            .map_err(|e| RepositoryError::from_sqlx("connect", e))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn run_migrations(&self) -> RepositoryResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepositoryError::QueryFailed {
                operation: "run_migrations",
                reason: e.to_string(),
            })?;
        info!("Indicator repository migrations applied");
        Ok(())
    }

    /// Insert or replace an indicator definition (ingestion/admin path)
    pub async fn upsert_indicator(&self, indicator: &IndicatorDefinition) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kpi_indicators (
                indicator_id, code, name, category, target_value, unit,
                threshold_warning, threshold_critical, status, steward_id,
                linked_work_container_ids, last_notified_level, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (indicator_id) DO UPDATE SET
                code = EXCLUDED.code,
                name = EXCLUDED.name,
                category = EXCLUDED.category,
                target_value = EXCLUDED.target_value,
                unit = EXCLUDED.unit,
                threshold_warning = EXCLUDED.threshold_warning,
                threshold_critical = EXCLUDED.threshold_critical,
                status = EXCLUDED.status,
                steward_id = EXCLUDED.steward_id,
                linked_work_container_ids = EXCLUDED.linked_work_container_ids,
                last_notified_level = EXCLUDED.last_notified_level,
                updated_at = NOW()
            "#,
        )
        .bind(indicator.indicator_id)
        .bind(&indicator.code)
        .bind(&indicator.name)
        .bind(&indicator.category)
        .bind(indicator.target_value)
        .bind(&indicator.unit)
        .bind(indicator.threshold_warning)
        .bind(indicator.threshold_critical)
        .bind(indicator.status.as_str())
        .bind(indicator.steward_id)
        .bind(&indicator.linked_work_container_ids)
        .bind(indicator.last_notified_level.as_str())
        .bind(indicator.created_at)
        .bind(indicator.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx("upsert_indicator", e))?;
        Ok(())
    }

    /// Insert an immutable data point (ingestion path)
    pub async fn insert_data_point(&self, point: &IndicatorDataPoint) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kpi_data_points (
                data_point_id, indicator_id, period_start, period_end,
                actual_value, collected_at, verification_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(point.data_point_id)
        .bind(point.indicator_id)
        .bind(point.period_start)
        .bind(point.period_end)
        .bind(point.actual_value)
        .bind(point.collected_at)
        .bind(point.verification_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx("insert_data_point", e))?;
        Ok(())
    }
}

fn is_open_task_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(OPEN_TASK_UNIQUE_INDEX)
        }
        _ => false,
    }
}

#[async_trait]
impl IndicatorRepository for PgIndicatorRepository {
    async fn list_eligible_indicators(&self) -> RepositoryResult<Vec<IndicatorDefinition>> {
        const OP: &str = "list_eligible_indicators";
        let sql = format!(
            "SELECT {INDICATOR_COLUMNS} FROM kpi_indicators \
             WHERE status IN ('active', 'monitoring', 'breached') ORDER BY code"
        );
        let rows: Vec<IndicatorRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_sqlx(OP, e))?;
        debug!(count = rows.len(), "Loaded eligible indicators");
        rows.into_iter().map(|row| row.into_model(OP)).collect()
    }

    async fn get_indicator(
        &self,
        indicator_id: Uuid,
    ) -> RepositoryResult<Option<IndicatorDefinition>> {
        const OP: &str = "get_indicator";
        let sql = format!("SELECT {INDICATOR_COLUMNS} FROM kpi_indicators WHERE indicator_id = $1");
        let row: Option<IndicatorRow> = sqlx::query_as(&sql)
            .bind(indicator_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_sqlx(OP, e))?;
        row.map(|r| r.into_model(OP)).transpose()
    }

    async fn get_latest_data_point(
        &self,
        indicator_id: Uuid,
    ) -> RepositoryResult<Option<IndicatorDataPoint>> {
        const OP: &str = "get_latest_data_point";
        let row: Option<DataPointRow> = sqlx::query_as(
            r#"
            SELECT data_point_id, indicator_id, period_start, period_end,
                   actual_value, collected_at, verification_status
            FROM kpi_data_points
            WHERE indicator_id = $1
            ORDER BY period_end DESC
            LIMIT 1
            "#,
        )
        .bind(indicator_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(OP, e))?;
        row.map(|r| r.into_model(OP)).transpose()
    }

    async fn update_indicator_status(
        &self,
        indicator_id: Uuid,
        expected: IndicatorStatus,
        new_status: IndicatorStatus,
    ) -> RepositoryResult<bool> {
        const OP: &str = "update_indicator_status";
        let result = sqlx::query(
            r#"
            UPDATE kpi_indicators
            SET status = $3, updated_at = NOW()
            WHERE indicator_id = $1
              AND status = $2
              AND status IN ('active', 'monitoring', 'breached')
            "#,
        )
        .bind(indicator_id)
        .bind(expected.as_str())
        .bind(new_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(OP, e))?;

        let applied = result.rows_affected() == 1;
        if !applied {
            debug!(
                indicator_id = %indicator_id,
                expected = %expected,
                new_status = %new_status,
                "Status update not applied, stored status changed since read"
            );
        }
        Ok(applied)
    }

    async fn record_notified_level(
        &self,
        indicator_id: Uuid,
        level: BreachLevel,
    ) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE kpi_indicators SET last_notified_level = $2 WHERE indicator_id = $1",
        )
        .bind(indicator_id)
        .bind(level.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx("record_notified_level", e))?;
        Ok(())
    }

    async fn find_open_task(
        &self,
        indicator_id: Uuid,
    ) -> RepositoryResult<Option<CorrectiveActionTask>> {
        const OP: &str = "find_open_task";
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM kpi_corrective_tasks \
             WHERE indicator_id = $1 AND status IN ('open', 'in_progress') LIMIT 1"
        );
        let row: Option<TaskRow> = sqlx::query_as(&sql)
            .bind(indicator_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_sqlx(OP, e))?;
        row.map(|r| r.into_model(OP)).transpose()
    }

    async fn create_corrective_task(
        &self,
        task: NewCorrectiveTask,
    ) -> RepositoryResult<CreateTaskOutcome> {
        const OP: &str = "create_corrective_task";
        let created = task.into_task(Utc::now());
        let sql = format!(
            "INSERT INTO kpi_corrective_tasks ({TASK_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {TASK_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(created.task_id)
            .bind(created.indicator_id)
            .bind(created.work_container_id)
            .bind(created.status.as_str())
            .bind(created.priority.as_str())
            .bind(created.due_date)
            .bind(created.owner_id)
            .bind(created.created_at)
            .fetch_one(&self.pool)
            .await;

        match inserted {
            Ok(row) => Ok(CreateTaskOutcome::Created(row.into_model(OP)?)),
            Err(e) if is_open_task_violation(&e) => {
                debug!(
                    indicator_id = %created.indicator_id,
                    "Open task insert rejected by uniqueness index"
                );
                Ok(CreateTaskOutcome::UniqueViolation)
            }
            Err(e) => Err(RepositoryError::from_sqlx(OP, e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

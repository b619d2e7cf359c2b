//! PostgreSQL repository tests; run with `--features postgres-tests` and a
//! reachable `DATABASE_URL`

#![cfg(feature = "postgres-tests")]

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use kpi_monitor::models::{
    BreachLevel, IndicatorDataPoint, IndicatorDefinition, NewCorrectiveTask, TaskPriority,
};
use kpi_monitor::repository::{CreateTaskOutcome, IndicatorRepository, PgIndicatorRepository};
use kpi_monitor::state_machine::IndicatorStatus;

fn indicator(code: &str, status: IndicatorStatus) -> IndicatorDefinition {
    IndicatorDefinition::new(code, "On-time delivery", 95.0)
        .with_thresholds(Some(8.0), Some(15.0))
        .with_status(status)
        .with_linked_work_container(Uuid::now_v7())
}

fn new_task(indicator: &IndicatorDefinition) -> NewCorrectiveTask {
    NewCorrectiveTask {
        indicator_id: indicator.indicator_id,
        work_container_id: indicator.linked_work_container_ids[0],
        priority: TaskPriority::High,
        due_date: Utc::now() + Duration::days(7),
        owner_id: indicator.steward_id,
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn test_lists_only_eligible_indicators(pool: PgPool) -> sqlx::Result<()> {
    let repository = PgIndicatorRepository::new(pool);
    for (code, status) in [
        ("A", IndicatorStatus::Active),
        ("B", IndicatorStatus::Breached),
        ("P", IndicatorStatus::Proposed),
        ("R", IndicatorStatus::Retired),
    ] {
        repository
            .upsert_indicator(&indicator(code, status))
            .await
            .unwrap();
    }

    let listed = repository.list_eligible_indicators().await.unwrap();
    let codes: Vec<&str> = listed.iter().map(|i| i.code.as_str()).collect();
    assert_eq!(codes, vec!["A", "B"]);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn test_round_trips_indicator_and_latest_point(pool: PgPool) -> sqlx::Result<()> {
    let repository = PgIndicatorRepository::new(pool);
    let definition = indicator("OTD", IndicatorStatus::Monitoring);
    repository.upsert_indicator(&definition).await.unwrap();

    let now = Utc::now();
    let earlier = IndicatorDataPoint::new(
        definition.indicator_id,
        now - Duration::days(60),
        now - Duration::days(30),
        90.0,
    );
    let latest = IndicatorDataPoint::new(
        definition.indicator_id,
        now - Duration::days(30),
        now,
        72.5,
    );
    repository.insert_data_point(&latest).await.unwrap();
    repository.insert_data_point(&earlier).await.unwrap();

    let stored = repository
        .get_indicator(definition.indicator_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, IndicatorStatus::Monitoring);
    assert_eq!(
        stored.linked_work_container_ids,
        definition.linked_work_container_ids
    );

    let point = repository
        .get_latest_data_point(definition.indicator_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(point.data_point_id, latest.data_point_id);
    assert_eq!(point.actual_value, 72.5);

    let overlapping = IndicatorDataPoint::new(
        definition.indicator_id,
        now - Duration::days(40),
        now - Duration::days(20),
        80.0,
    );
    assert!(repository.insert_data_point(&overlapping).await.is_err());
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn test_status_update_persists(pool: PgPool) -> sqlx::Result<()> {
    let repository = PgIndicatorRepository::new(pool);
    let definition = indicator("OTD", IndicatorStatus::Active);
    repository.upsert_indicator(&definition).await.unwrap();

    let applied = repository
        .update_indicator_status(
            definition.indicator_id,
            IndicatorStatus::Active,
            IndicatorStatus::Breached,
        )
        .await
        .unwrap();
    assert!(applied);

    let stored = repository
        .get_indicator(definition.indicator_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, IndicatorStatus::Breached);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn test_status_update_requires_expected_status(pool: PgPool) -> sqlx::Result<()> {
    let repository = PgIndicatorRepository::new(pool);
    let definition = indicator("OTD", IndicatorStatus::Retired);
    repository.upsert_indicator(&definition).await.unwrap();

    let retired = repository
        .update_indicator_status(
            definition.indicator_id,
            IndicatorStatus::Retired,
            IndicatorStatus::Active,
        )
        .await
        .unwrap();
    assert!(!retired);

    let live = indicator("NPS", IndicatorStatus::Monitoring);
    repository.upsert_indicator(&live).await.unwrap();
    let stale = repository
        .update_indicator_status(
            live.indicator_id,
            IndicatorStatus::Active,
            IndicatorStatus::Breached,
        )
        .await
        .unwrap();
    assert!(!stale);

    let stored = repository
        .get_indicator(definition.indicator_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, IndicatorStatus::Retired);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn test_notified_level_round_trips(pool: PgPool) -> sqlx::Result<()> {
    let repository = PgIndicatorRepository::new(pool);
    let definition = indicator("OTD", IndicatorStatus::Breached);
    repository.upsert_indicator(&definition).await.unwrap();

    repository
        .record_notified_level(definition.indicator_id, BreachLevel::Critical)
        .await
        .unwrap();

    let stored = repository
        .get_indicator(definition.indicator_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.last_notified_level, BreachLevel::Critical);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn test_unique_index_rejects_second_open_task(pool: PgPool) -> sqlx::Result<()> {
    let repository = PgIndicatorRepository::new(pool);
    let definition = indicator("OTD", IndicatorStatus::Breached);
    repository.upsert_indicator(&definition).await.unwrap();

    let first = repository
        .create_corrective_task(new_task(&definition))
        .await
        .unwrap();
    let CreateTaskOutcome::Created(task) = first else {
        panic!("expected the first insert to succeed");
    };

    let second = repository
        .create_corrective_task(new_task(&definition))
        .await
        .unwrap();
    assert_eq!(second, CreateTaskOutcome::UniqueViolation);

    let open = repository
        .find_open_task(definition.indicator_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(open.task_id, task.task_id);

    sqlx::query("UPDATE kpi_corrective_tasks SET status = 'done' WHERE task_id = $1")
        .bind(task.task_id)
        .execute(repository.pool())
        .await?;
    assert!(repository
        .find_open_task(definition.indicator_id)
        .await
        .unwrap()
        .is_none());

    let third = repository
        .create_corrective_task(new_task(&definition))
        .await
        .unwrap();
    assert!(matches!(third, CreateTaskOutcome::Created(_)));
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn test_concurrent_inserts_yield_single_open_task(pool: PgPool) -> sqlx::Result<()> {
    let repository = PgIndicatorRepository::new(pool);
    let definition = indicator("OTD", IndicatorStatus::Breached);
    repository.upsert_indicator(&definition).await.unwrap();

    let (left, right) = tokio::join!(
        repository.create_corrective_task(new_task(&definition)),
        repository.create_corrective_task(new_task(&definition)),
    );
    let outcomes = [left.unwrap(), right.unwrap()];

    let created = outcomes
        .iter()
        .filter(|o| matches!(o, CreateTaskOutcome::Created(_)))
        .count();
    assert_eq!(created, 1);
    assert!(outcomes.contains(&CreateTaskOutcome::UniqueViolation));
    Ok(())
}

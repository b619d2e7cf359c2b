mod common;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use common::{record_value, Harness, IndicatorBuilder};
use kpi_monitor::config::{BackoffConfig, RetentionConfig};
use kpi_monitor::execution::{BreachJobHandler, JobHandler, WorkerPool, WorkerPoolConfig};
use kpi_monitor::messaging::{
    InMemoryJobQueue, JobEnvelope, JobExecutionResult, JobQueue, MonitoringJob,
};
use kpi_monitor::orchestration::BackoffCalculator;

/// Handler that replays a fixed list of results, then succeeds
#[derive(Default)]
struct ScriptedHandler {
    script: Mutex<VecDeque<JobExecutionResult>>,
    calls: Mutex<Vec<u32>>,
}

impl ScriptedHandler {
    fn new(script: Vec<JobExecutionResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn attempts_seen(&self) -> Vec<u32> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    async fn handle(&self, envelope: &JobEnvelope) -> JobExecutionResult {
        self.calls.lock().push(envelope.attempts);
        self.script
            .lock()
            .pop_front()
            .unwrap_or(JobExecutionResult::Success)
    }
}

struct SlowHandler {
    delay: Duration,
}

#[async_trait]
impl JobHandler for SlowHandler {
    async fn handle(&self, _envelope: &JobEnvelope) -> JobExecutionResult {
        tokio::time::sleep(self.delay).await;
        JobExecutionResult::Success
    }
}

fn retryable(reason: &str) -> JobExecutionResult {
    JobExecutionResult::Retryable {
        reason: reason.to_string(),
        retry_after: None,
    }
}

fn immediate_backoff() -> BackoffCalculator {
    BackoffCalculator::new(BackoffConfig {
        base_delay_ms: 0,
        max_delay_ms: 0,
        multiplier: 2.0,
        jitter_enabled: false,
        max_jitter: 0.0,
    })
}

fn pool_config(max_attempts: u32) -> WorkerPoolConfig {
    WorkerPoolConfig {
        worker_count: 2,
        poll_interval: Duration::from_millis(10),
        visibility_timeout: Duration::from_secs(30),
        job_timeout: Duration::from_secs(5),
        max_attempts,
    }
}

fn queue(max_attempts: u32) -> Arc<InMemoryJobQueue> {
    Arc::new(InMemoryJobQueue::new(max_attempts, RetentionConfig::default()))
}

#[tokio::test]
async fn test_retryable_result_is_redelivered_until_success() {
    let queue = queue(5);
    let handler = Arc::new(ScriptedHandler::new(vec![
        retryable("connection reset"),
        retryable("connection reset"),
    ]));
    let pool = WorkerPool::new(
        queue.clone(),
        handler.clone(),
        immediate_backoff(),
        pool_config(5),
    );
    queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();

    for _ in 0..3 {
        assert!(pool.run_once().await.unwrap());
    }
    assert!(!pool.run_once().await.unwrap());

    assert_eq!(handler.attempts_seen(), vec![1, 2, 3]);
    let stats = pool.stats();
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 0);

    let queue_stats = queue.stats().await.unwrap();
    assert_eq!(queue_stats.completed, 1);
    assert_eq!(queue_stats.pending + queue_stats.in_flight, 0);
}

#[tokio::test]
async fn test_exhausted_attempts_park_the_job() {
    let queue = queue(3);
    let handler = Arc::new(ScriptedHandler::new(vec![
        retryable("database unavailable"),
        retryable("database unavailable"),
        retryable("database unavailable"),
        retryable("database unavailable"),
    ]));
    let pool = WorkerPool::new(
        queue.clone(),
        handler.clone(),
        immediate_backoff(),
        pool_config(3),
    );
    queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();

    while pool.run_once().await.unwrap() {}

    assert_eq!(handler.attempts_seen(), vec![1, 2, 3]);
    let failed = queue.failed_jobs().await.unwrap();
    assert_eq!(failed.len(), 1);
    let reason = failed[0].last_error.as_deref().unwrap();
    assert!(reason.contains("exhausted 3 attempts"));
    assert!(reason.contains("database unavailable"));
    assert_eq!(pool.stats().failed, 1);
}

#[tokio::test]
async fn test_permanent_result_parks_without_retry() {
    let queue = queue(5);
    let handler = Arc::new(ScriptedHandler::new(vec![JobExecutionResult::Permanent {
        reason: "indicator not found".to_string(),
    }]));
    let pool = WorkerPool::new(
        queue.clone(),
        handler.clone(),
        immediate_backoff(),
        pool_config(5),
    );
    queue
        .enqueue(
            MonitoringJob::ProcessOne {
                indicator_id: uuid::Uuid::now_v7(),
            },
            None,
        )
        .await
        .unwrap();

    assert!(pool.run_once().await.unwrap());
    assert!(!pool.run_once().await.unwrap());

    assert_eq!(handler.attempts_seen(), vec![1]);
    let failed = queue.failed_jobs().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].last_error.as_deref(), Some("indicator not found"));
}

#[tokio::test]
async fn test_timed_out_job_is_retried() {
    let queue = queue(5);
    let handler = Arc::new(SlowHandler {
        delay: Duration::from_millis(200),
    });
    let config = WorkerPoolConfig {
        job_timeout: Duration::from_millis(20),
        ..pool_config(2)
    };
    let pool = WorkerPool::new(queue.clone(), handler, immediate_backoff(), config);
    queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();

    assert!(pool.run_once().await.unwrap());
    let stats = pool.stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.retried, 1);

    assert!(pool.run_once().await.unwrap());
    let failed = queue.failed_jobs().await.unwrap();
    assert_eq!(failed.len(), 1);
    let reason = failed[0].last_error.as_deref().unwrap();
    assert!(reason.contains("Timeout error for operation process_all job"));
    assert!(reason.contains("20ms"));
}

#[tokio::test]
async fn test_unknown_indicator_job_fails_permanently() {
    let harness = Harness::new();
    let handler = Arc::new(BreachJobHandler::new(Arc::new(harness.processor)));
    let queue = queue(5);
    let pool = WorkerPool::new(
        queue.clone(),
        handler,
        immediate_backoff(),
        pool_config(5),
    );
    queue
        .enqueue(
            MonitoringJob::ProcessOne {
                indicator_id: uuid::Uuid::now_v7(),
            },
            None,
        )
        .await
        .unwrap();

    assert!(pool.run_once().await.unwrap());

    let failed = queue.failed_jobs().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 1);
    assert!(failed[0]
        .last_error
        .as_deref()
        .unwrap()
        .contains("not found"));
}

#[tokio::test]
async fn test_transient_listing_failure_is_retried_by_the_pool() {
    let harness = Harness::new();
    let indicator = IndicatorBuilder::new().insert(&harness.repository);
    record_value(&harness.repository, indicator.indicator_id, 1, 70.0);
    harness.repository.fail_next("list_eligible_indicators", 1);

    let handler = Arc::new(BreachJobHandler::new(Arc::new(harness.processor)));
    let queue = queue(5);
    let pool = WorkerPool::new(
        queue.clone(),
        handler.clone(),
        immediate_backoff(),
        pool_config(5),
    );
    queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();

    assert!(pool.run_once().await.unwrap());
    assert!(handler.last_summary().is_none());
    assert!(pool.run_once().await.unwrap());

    let summary = handler.last_summary().unwrap();
    assert_eq!(summary.tasks_created, 1);
    assert_eq!(harness.repository.open_task_count(indicator.indicator_id), 1);
    assert_eq!(queue.completed_jobs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_started_pool_drains_queue_and_shuts_down() {
    let queue = queue(5);
    let handler = Arc::new(ScriptedHandler::default());
    let pool = WorkerPool::new(
        queue.clone(),
        handler.clone(),
        immediate_backoff(),
        pool_config(5),
    );
    for _ in 0..4 {
        queue.enqueue(MonitoringJob::ProcessAll, None).await.unwrap();
    }

    pool.start();
    assert!(pool.is_running());

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if queue.stats().await.unwrap().completed == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(drained.is_ok());

    pool.shutdown().await;
    assert!(!pool.is_running());
    assert_eq!(pool.stats().succeeded, 4);
}

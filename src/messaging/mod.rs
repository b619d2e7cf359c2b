//! # Job Messaging
//!
//! Decouples triggering from execution: the scheduler enqueues typed
//! [`MonitoringJob`]s, the worker pool receives and settles them. Jobs live
//! in process memory or in the durable `kpi_jobs` table.

pub mod errors;
pub mod in_memory;
pub mod jobs;
pub mod postgres;
pub mod queue;

pub use errors::{QueueError, QueueResult};
pub use in_memory::InMemoryJobQueue;
pub use postgres::PgJobQueue;
pub use jobs::{
    EnqueueOutcome, JobEnvelope, JobExecutionResult, JobState, MonitoringJob, ReceiptHandle,
    ReceivedJob,
};
pub use queue::{JobQueue, QueueStats};

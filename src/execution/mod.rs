//! # Job Execution
//!
//! Worker pool and the job handlers it dispatches to.

pub mod job_handler;
pub mod worker_pool;

pub use job_handler::{BreachJobHandler, JobHandler};
pub use worker_pool::{WorkerPool, WorkerPoolConfig, WorkerPoolStats};

//! # Indicator Persistence
//!
//! Repository trait consumed by the breach processor plus in-memory and
//! PostgreSQL implementations.

pub mod errors;
pub mod in_memory;
pub mod postgres;
pub mod traits;

pub use errors::{RepositoryError, RepositoryResult};
pub use in_memory::InMemoryIndicatorRepository;
pub use postgres::PgIndicatorRepository;
pub use traits::{CreateTaskOutcome, IndicatorRepository};

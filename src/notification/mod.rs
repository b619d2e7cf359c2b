//! # Breach Notification
//!
//! The processor hands breach events to a [`BreachNotifier`]. Delivery
//! (email, webhooks, templating, delivery retries) belongs to whatever sits
//! behind the trait.

pub mod publisher;
pub mod recording;

use async_trait::async_trait;

use crate::errors::MonitorResult;
use crate::models::BreachEvent;

pub use publisher::BroadcastBreachPublisher;
pub use recording::RecordingBreachNotifier;

/// Receiver of breach events
#[async_trait]
pub trait BreachNotifier: Send + Sync + 'static {
    async fn publish(&self, event: &BreachEvent) -> MonitorResult<()>;
}

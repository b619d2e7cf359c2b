use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::BreachNotifier;
use crate::errors::{MonitorError, MonitorResult};
use crate::models::BreachEvent;

/// Notifier that keeps every event it receives; used in tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingBreachNotifier {
    events: Mutex<Vec<BreachEvent>>,
    failures_remaining: AtomicUsize,
}

impl RecordingBreachNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` publishes
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<BreachEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl BreachNotifier for RecordingBreachNotifier {
    async fn publish(&self, event: &BreachEvent) -> MonitorResult<()> {
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if should_fail {
            return Err(MonitorError::Notification(format!(
                "injected delivery failure for {}",
                event.indicator_id
            )));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

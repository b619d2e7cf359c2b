use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::BreachNotifier;
use crate::errors::MonitorResult;
use crate::models::BreachEvent;

/// Fan-out publisher for breach events
#[derive(Debug, Clone)]
pub struct BroadcastBreachPublisher {
    sender: broadcast::Sender<BreachEvent>,
}

impl BroadcastBreachPublisher {
    /// Create a new publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreachEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastBreachPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl BreachNotifier for BroadcastBreachPublisher {
    async fn publish(&self, event: &BreachEvent) -> MonitorResult<()> {
        // send() only fails when nobody is subscribed, which is not an error here
        if self.sender.send(event.clone()).is_err() {
            debug!(
                indicator_id = %event.indicator_id,
                event_name = %event.event_name,
                "No breach event subscribers"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BreachLevel;
    use chrono::Utc;
    use uuid::Uuid;

    fn event() -> BreachEvent {
        BreachEvent {
            event_id: Uuid::now_v7(),
            event_name: "indicator.breach_detected".to_string(),
            indicator_id: Uuid::now_v7(),
            indicator_code: "OTD".to_string(),
            level: BreachLevel::Critical,
            previous_level: BreachLevel::None,
            current_value: 72.5,
            target_value: 95.0,
            deviation_pct: -23.68,
            owner_id: Uuid::now_v7(),
            detected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let publisher = BroadcastBreachPublisher::new(16);
        let mut receiver = publisher.subscribe();
        let sent = event();

        publisher.publish(&sent).await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received, sent);
        assert_eq!(publisher.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = BroadcastBreachPublisher::default();
        assert!(publisher.publish(&event()).await.is_ok());
    }
}

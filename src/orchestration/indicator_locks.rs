//! # Indicator Locks
//!
//! Per-indicator async single-flight locks. Entries are created on first use
//! and dropped once the last holder or waiter releases them, so the map only
//! ever holds indicators that are being worked on.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct IndicatorLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl IndicatorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `indicator_id`
    pub async fn acquire(&self, indicator_id: Uuid) -> IndicatorLock<'_> {
        let lock = self
            .locks
            .entry(indicator_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        IndicatorLock {
            locks: self,
            indicator_id,
            guard: Some(guard),
        }
    }

    /// Number of indicators currently held or waited on
    pub fn held(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive hold on one indicator, released on drop
#[derive(Debug)]
pub struct IndicatorLock<'a> {
    locks: &'a IndicatorLocks,
    indicator_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IndicatorLock<'_> {
    fn drop(&mut self) {
        // Release the mutex first so our own reference no longer counts
        drop(self.guard.take());
        self.locks
            .locks
            .remove_if(&self.indicator_id, |_, entry| Arc::strong_count(entry) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_indicator_is_serialized() {
        let locks = Arc::new(IndicatorLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let indicator_id = Uuid::now_v7();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                tokio::spawn(async move {
                    let _held = locks.acquire(indicator_id).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.held(), 0);
    }

    #[tokio::test]
    async fn test_different_indicators_do_not_block() {
        let locks = IndicatorLocks::new();
        let _first = locks.acquire(Uuid::now_v7()).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire(Uuid::now_v7()))
            .await;
        assert!(second.is_ok());
        assert_eq!(locks.held(), 2);
    }
}

//! Manually driven wall clock

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use warden_core::effects::{PhysicalTimeEffects, TimeError};

/// Clock that only moves when a test moves it.
///
/// Clones share the same underlying time, so the ledger, guardian and
/// verification service can all observe one timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock starting at `start` Unix seconds
    pub fn new(start: u64) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn now(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn advance(&self, secs: u64) {
        self.current.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, timestamp: u64) {
        self.current.store(timestamp, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        // 2023-11-14T22:13:20Z, aligned to a minute boundary
        Self::new(1_700_000_000 - 1_700_000_000 % 60)
    }
}

#[async_trait]
impl PhysicalTimeEffects for ManualClock {
    async fn now_secs(&self) -> Result<u64, TimeError> {
        Ok(self.now())
    }

    /// Sleeps on the tokio timer; the manual timeline is not moved.
    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_time() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        other.advance(59);
        assert_eq!(clock.now_secs().await.unwrap(), 1_059);
        clock.set(5);
        assert_eq!(other.now(), 5);
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::clock::Clock;

/// Process-wide spacing gate for outbound calls.
///
/// Every caller goes through `acquire` before starting a request. If the previous
/// request started less than `spacing` ago, the caller sleeps until exactly
/// `spacing` has elapsed. Waiters queue on a fair mutex, so concurrent callers are
/// released one at a time in arrival order.
pub struct RateGate {
    spacing: Duration,
    clock: Arc<dyn Clock>,
    /// Start instant of the most recent outbound call.
    last_start: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(spacing: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            spacing,
            clock,
            last_start: Mutex::new(None),
        }
    }

    /// Wait for the next free slot and claim it. Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let mut last = self.last_start.lock().await;
        let now = self.clock.now();
        let wait = match *last {
            Some(prev) => (prev + self.spacing).saturating_duration_since(now),
            None => Duration::ZERO,
        };
        if !wait.is_zero() {
            self.clock.sleep(wait).await;
        }
        *last = Some(self.clock.now());
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::manual::ManualClock;

    #[tokio::test]
    async fn first_call_passes_immediately() {
        let clock = Arc::new(ManualClock::new());
        let gate = RateGate::new(Duration::from_secs(45), clock.clone());
        assert_eq!(gate.acquire().await, Duration::ZERO);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn back_to_back_calls_wait_exactly_the_spacing() {
        let clock = Arc::new(ManualClock::new());
        let gate = RateGate::new(Duration::from_secs(45), clock.clone());
        gate.acquire().await;
        assert_eq!(gate.acquire().await, Duration::from_secs(45));

        // 10s of the next window already elapsed
        clock.advance(Duration::from_secs(10));
        assert_eq!(gate.acquire().await, Duration::from_secs(35));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(45), Duration::from_secs(35)]
        );
    }

    #[tokio::test]
    async fn no_wait_once_spacing_has_elapsed() {
        let clock = Arc::new(ManualClock::new());
        let gate = RateGate::new(Duration::from_secs(45), clock.clone());
        gate.acquire().await;
        clock.advance(Duration::from_secs(60));
        assert_eq!(gate.acquire().await, Duration::ZERO);
    }
}

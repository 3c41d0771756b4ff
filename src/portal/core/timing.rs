//! Randomized delays and cancellable sleeping.
//!
//! Portals throttle clients that fire requests back to back, so the engine
//! spaces some requests with a random pause. Every pause observes the run's
//! cancellation token.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Uniform random delay between two bounds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomDelay {
    min_ms: u64,
    max_ms: u64,
}

impl RandomDelay {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms,
            max_ms: max_ms.max(min_ms),
        }
    }

    pub fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn next_delay(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }

    /// Sleep for a random duration. Returns `false` if cancelled meanwhile.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        let delay = self.next_delay();
        log::debug!("random delay: {} ms", delay.as_millis());
        sleep_cancellable(delay, cancel).await
    }
}

impl Default for RandomDelay {
    fn default() -> Self {
        Self::new(1000, 3000)
    }
}

/// Sleep unless the token fires first. Returns `false` when cancelled.
pub async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_stays_within_bounds() {
        let delay = RandomDelay::new(10, 20);
        for _ in 0..50 {
            let next = delay.next_delay();
            assert!(next >= Duration::from_millis(10) && next <= Duration::from_millis(20));
        }
        assert_eq!(RandomDelay::new(30, 5).next_delay(), Duration::from_millis(30));
    }

    #[tokio::test]
    async fn cancelled_sleep_returns_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!sleep_cancellable(Duration::from_secs(60), &cancel).await);
    }
}

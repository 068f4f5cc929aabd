//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;

/// Configuration for sync operations.
///
/// `peer` names the remote counterpart; checkpoints are persisted in the
/// local store's metadata under keys derived from it, so one store can sync
/// with several peers independently.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Name of the remote peer, used to key persisted checkpoints.
    pub peer: String,
    /// Maximum events pulled from the remote per round trip.
    pub receive_batch_size: usize,
    /// Maximum events pushed to the remote per round trip.
    pub send_batch_size: usize,
    /// Retry configuration for [`crate::SyncEngine::sync_with_retry`].
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration for the named peer with default batch sizes.
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            receive_batch_size: 100,
            send_batch_size: 100,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the pull batch size.
    #[must_use]
    pub fn with_receive_batch_size(mut self, size: usize) -> Self {
        self.receive_batch_size = size;
        self
    }

    /// Sets the push batch size.
    #[must_use]
    pub fn with_send_batch_size(mut self, size: usize) -> Self {
        self.send_batch_size = size;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("remote")
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration allowing up to `max_attempts` tries.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// A configuration that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculates the delay before the given attempt (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            let jitter = capped * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(capped + jitter)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("server")
            .with_receive_batch_size(50)
            .with_send_batch_size(25);
        assert_eq!(config.peer, "server");
        assert_eq!(config.receive_batch_size, 50);
        assert_eq!(config.send_batch_size, 25);
    }

    #[test]
    fn first_attempt_has_no_delay() {
        assert_eq!(RetryConfig::default().delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn backoff_grows_and_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1));

        let d1 = config.delay_for_attempt(1);
        let d3 = config.delay_for_attempt(3);
        assert!(d1 >= Duration::from_millis(100));
        assert!(d3 >= d1);
        // 1s cap plus at most 25% jitter
        assert!(config.delay_for_attempt(9) <= Duration::from_millis(1250));
    }
}

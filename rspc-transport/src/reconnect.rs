//! Reconnection policy for persistent connections.
//!
//! The wait before the next attempt is a base delay picked from an escalating
//! schedule by the number of consecutive failures (saturating at the last
//! entry) plus a random jitter. There is no retry cap.

use crate::transport::ConfigError;
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub const DEFAULT_BACKOFF_MS: [u64; 4] = [1000, 2000, 5000, 10000];
pub const DEFAULT_MAX_JITTER_MS: u64 = 5000;

/// Base delays and jitter bound for reconnect attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    delays: Vec<Duration>,
    max_jitter: Duration,
}

impl BackoffConfig {
    /// Build a schedule. Delays must be non-empty and non-decreasing.
    pub fn new(delays: Vec<Duration>, max_jitter: Duration) -> Result<Self, ConfigError> {
        if delays.is_empty() {
            return Err(ConfigError::EmptyBackoff);
        }
        if let Some(index) = delays.windows(2).position(|pair| pair[1] < pair[0]) {
            return Err(ConfigError::DecreasingBackoff { index: index + 1 });
        }
        Ok(Self { delays, max_jitter })
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn max_jitter(&self) -> Duration {
        self.max_jitter
    }

    /// Base delay after `failures` consecutive failed attempts.
    pub fn base_delay(&self, failures: u32) -> Duration {
        self.delays
            .get(failures as usize)
            .or(self.delays.last())
            .copied()
            .unwrap_or_default()
    }

    /// Base delay plus a jitter in `1..=max_jitter` milliseconds.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        let jitter = if max_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(1..=max_ms))
        };
        self.base_delay(failures) + jitter
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            delays: DEFAULT_BACKOFF_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            max_jitter: Duration::from_millis(DEFAULT_MAX_JITTER_MS),
        }
    }
}

/// Lifecycle of a persistent connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// The socket is gone. `retrying` is false once the owner shut it down.
    Closed { retrying: bool },
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Tracks consecutive connection failures and picks the next backoff.
#[derive(Debug)]
pub struct ReconnectController {
    backoff: BackoffConfig,
    failures: AtomicU32,
}

impl ReconnectController {
    pub fn new(backoff: BackoffConfig) -> Self {
        Self {
            backoff,
            failures: AtomicU32::new(0),
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Count a failed attempt and return the new failure count.
    pub fn record_failure(&self) -> u32 {
        let previous = self
            .failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_add(1))
            })
            .unwrap_or(u32::MAX);
        previous.saturating_add(1)
    }

    pub fn record_open(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    /// How long to wait before the next attempt.
    pub fn next_delay(&self) -> Duration {
        self.backoff.delay_for(self.failures())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|v| Duration::from_millis(*v)).collect()
    }

    #[test]
    fn test_default_schedule() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.base_delay(0), Duration::from_millis(1000));
        assert_eq!(backoff.base_delay(3), Duration::from_millis(10000));
        assert_eq!(backoff.base_delay(40), Duration::from_millis(10000));
    }

    #[test]
    fn test_rejects_bad_schedules() {
        assert!(matches!(
            BackoffConfig::new(vec![], Duration::ZERO),
            Err(ConfigError::EmptyBackoff)
        ));
        assert!(matches!(
            BackoffConfig::new(ms(&[10, 30, 20]), Duration::ZERO),
            Err(ConfigError::DecreasingBackoff { index: 2 })
        ));
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let backoff = BackoffConfig::new(ms(&[5, 10]), Duration::ZERO).unwrap();
        assert_eq!(backoff.delay_for(0), Duration::from_millis(5));
        assert_eq!(backoff.delay_for(9), Duration::from_millis(10));
    }

    #[test]
    fn test_controller_resets_on_open() {
        let controller = ReconnectController::new(BackoffConfig::default());
        assert_eq!(controller.record_failure(), 1);
        assert_eq!(controller.record_failure(), 2);
        assert_eq!(controller.failures(), 2);

        controller.record_open();
        assert_eq!(controller.failures(), 0);
    }

    proptest! {
        #[test]
        fn prop_delay_is_base_plus_bounded_jitter(failures in 0u32..1000) {
            let backoff = BackoffConfig::default();
            let base = backoff.base_delay(failures);
            let delay = backoff.delay_for(failures);
            prop_assert!(delay > base);
            prop_assert!(delay <= base + backoff.max_jitter());
        }

        #[test]
        fn prop_base_delay_never_decreases(failures in 0u32..1000) {
            let backoff = BackoffConfig::default();
            prop_assert!(backoff.base_delay(failures) <= backoff.base_delay(failures + 1));
        }

        #[test]
        fn prop_failures_count_every_attempt(attempts in 1u32..50) {
            let controller = ReconnectController::new(BackoffConfig::default());
            for _ in 0..attempts {
                controller.record_failure();
            }
            prop_assert_eq!(controller.failures(), attempts);
            controller.record_open();
            prop_assert_eq!(controller.failures(), 0);
        }
    }
}

//! Scheduler configuration with environment variable overrides.

use crate::error::{Result, SchedulerError};
use std::time::Duration;

/// Runtime configuration for the worker pool driver and scheduler core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of concurrent workers. `0` resolves to the available
    /// hardware concurrency at run time.
    pub parallelism: usize,
    /// Bounded wait used by blocked `dequeue` calls before re-checking the
    /// ready queue. Workers parked behind a worker-incompatible queue head
    /// rely on this re-check in addition to condvar wake-ups.
    pub dequeue_poll_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parallelism: 0,
            dequeue_poll_ms: 100,
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables: `MODSCHED_PARALLELISM`, `MODSCHED_DEQUEUE_POLL_MS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(parallelism) = std::env::var("MODSCHED_PARALLELISM") {
            config.parallelism = parallelism.parse().map_err(|e| {
                SchedulerError::builder_misuse(format!("invalid MODSCHED_PARALLELISM: {e}"))
            })?;
        }

        if let Ok(poll_ms) = std::env::var("MODSCHED_DEQUEUE_POLL_MS") {
            config.dequeue_poll_ms = poll_ms.parse().map_err(|e| {
                SchedulerError::builder_misuse(format!("invalid MODSCHED_DEQUEUE_POLL_MS: {e}"))
            })?;
        }

        Ok(config)
    }

    /// Resolve the effective worker count: the configured value when
    /// positive, otherwise the available hardware concurrency.
    pub fn resolved_parallelism(&self) -> usize {
        if self.parallelism > 0 {
            return self.parallelism;
        }
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
    }

    /// Polling interval for blocked dequeue waits
    pub fn dequeue_poll(&self) -> Duration {
        Duration::from_millis(self.dequeue_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_to_hardware_concurrency() {
        let config = SchedulerConfig::default();
        assert_eq!(config.parallelism, 0);
        assert!(config.resolved_parallelism() >= 1);
    }

    #[test]
    fn explicit_parallelism_wins() {
        let config = SchedulerConfig {
            parallelism: 3,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.resolved_parallelism(), 3);
    }

    #[test]
    fn from_env_rejects_garbage() {
        std::env::set_var("MODSCHED_PARALLELISM", "not-a-number");
        let result = SchedulerConfig::from_env();
        std::env::remove_var("MODSCHED_PARALLELISM");
        assert!(result.is_err());
    }
}

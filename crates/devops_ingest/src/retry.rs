//! Retry policy for transient remote failures.
//!
//! The gateway owns the retry loop. This module decides which statuses are
//! retried and the delays between attempts.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use serde::Deserialize;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Maximum retries for a transient failure on a single request.
pub const MAX_TRANSIENT_RETRIES: usize = 3;

/// Status codes treated as transient by default.
pub const DEFAULT_TRANSIENT_STATUSES: &[u16] = &[500, 502, 503, 504];

/// Configuration for retry operations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    #[serde(with = "millis")]
    pub min_delay: Duration,
    /// Maximum delay between retries.
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
    /// HTTP statuses that are retried with backoff.
    pub transient_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_TRANSIENT_RETRIES,
            with_jitter: true,
            transient_statuses: DEFAULT_TRANSIENT_STATUSES.to_vec(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            ..Self::default()
        }
    }

    /// Set whether to use jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Whether `status` should be retried with backoff.
    #[must_use]
    pub fn is_transient_status(&self, status: u16) -> bool {
        self.transient_statuses.contains(&status)
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }

    /// The sequence of delays for one request; yields `None` once retries are exhausted.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + Send + use<> {
        self.clone().into_backoff().build()
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

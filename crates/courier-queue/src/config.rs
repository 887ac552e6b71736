//! Queue configuration
//!
//! Defaults match the values the community site has always run with; every
//! field can be overridden through `COURIER_*` environment variables.

use std::env;
use std::time::Duration;

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Upper bound on in-flight deliveries
    pub max_concurrent_jobs: usize,
    /// Upper bound on jobs pulled per tick
    pub batch_size: usize,
    /// Minimum wait between two attempts of the same job
    pub retry_delay: Duration,
    /// Retry ceiling for jobs that don't set their own
    pub max_retries: u32,
    /// Dispatch tick period
    pub processing_interval: Duration,
    /// Per-attempt deadline; `None` lets a delivery run as long as it likes
    pub attempt_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            batch_size: 10,
            retry_delay: Duration::from_millis(300_000),
            max_retries: 3,
            processing_interval: Duration::from_millis(30_000),
            attempt_timeout: None,
        }
    }
}

impl QueueConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - COURIER_MAX_CONCURRENT_JOBS
    /// - COURIER_BATCH_SIZE
    /// - COURIER_RETRY_DELAY_MS
    /// - COURIER_MAX_RETRIES
    /// - COURIER_PROCESSING_INTERVAL_MS
    /// - COURIER_ATTEMPT_TIMEOUT_MS
    ///
    /// Missing or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: parse_env("COURIER_MAX_CONCURRENT_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs),
            batch_size: parse_env("COURIER_BATCH_SIZE").unwrap_or(defaults.batch_size),
            retry_delay: parse_env("COURIER_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            max_retries: parse_env("COURIER_MAX_RETRIES").unwrap_or(defaults.max_retries),
            processing_interval: parse_env("COURIER_PROCESSING_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.processing_interval),
            attempt_timeout: parse_env("COURIER_ATTEMPT_TIMEOUT_MS").map(Duration::from_millis),
        }
    }

    pub fn with_max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = n;
        self
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_processing_interval(mut self, interval: Duration) -> Self {
        self.processing_interval = interval;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".to_string()));
        }
        if self.processing_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "processing_interval must be non-zero".to_string(),
            ));
        }
        if matches!(self.attempt_timeout, Some(t) if t.is_zero()) {
            return Err(ConfigError::Invalid(
                "attempt_timeout must be non-zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

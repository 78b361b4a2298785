//! Plan execution configuration: worker pool size, request pacing, and
//! retry behavior for deletion calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Execution settings for the plan executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Maximum number of deletion calls in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Minimum interval between dispatched calls in milliseconds, enforced
    /// by a single limiter shared across all workers in a run. 0 disables
    /// pacing.
    #[serde(default)]
    pub min_request_interval_ms: u64,

    /// Retry behavior for retryable per-item failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            min_request_interval_ms: 0,
            retry: RetryConfig::default(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

impl ExecutionConfig {
    /// Minimum request interval as a Duration.
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    /// Validate execution settings.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("execution.concurrency must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err("execution.retry.jitter must be between 0.0 and 1.0".into());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err("execution.retry.backoff_multiplier must be at least 1.0".into());
        }
        Ok(())
    }
}

/// Configuration for deletion-call retries.
///
/// Retries apply only to retryable failure classes (transient network
/// errors, timeouts, rate limits); not-found and permission-denied fail
/// immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Whether retries are enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of retry attempts (not including the initial call).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay before the first retry in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Random jitter applied to delays (fraction, 0.0-1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    4_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

impl RetryConfig {
    /// Calculate the delay for a given retry attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let jitter_range = capped_delay * self.jitter;
        let jitter = if jitter_range > 0.0 {
            use rand::Rng;
            rand::thread_rng().gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };

        let final_delay = (capped_delay + jitter).max(0.0);
        Duration::from_millis(final_delay as u64)
    }
}

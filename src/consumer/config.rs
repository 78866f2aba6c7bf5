//! Consumer Configuration
//!
//! This module provides the configuration surface for fault-tolerant consumers.
//! All resilience/performance tradeoffs (batch size, retry budget, backoff base,
//! checkpoint save frequency) are explicit parameters validated at construction,
//! never hidden constants.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on the retry budget.
///
/// Exponential backoff doubles the delay per attempt, so anything beyond
/// 2^20 * base_delay is effectively unbounded and risks duration overflow.
pub const MAX_RETRY_LIMIT: u32 = 20;

/// Configuration errors detected at consumer construction
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("batch size must be positive, got: {0}")]
    InvalidBatchSize(usize),

    #[error("base delay must be positive")]
    InvalidBaseDelay,

    #[error("checkpoint interval must be positive, got: {0}")]
    InvalidCheckpointInterval(u64),

    #[error("max retries {requested} exceeds the supported limit of {limit}")]
    RetryLimitExceeded { requested: u32, limit: u32 },
}

/// Per-consumer configuration
///
/// Controls batching, retry behavior, checkpoint save frequency, and the
/// durable output namespace for one consumer identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Number of elements accumulated before a batch is dispatched
    pub batch_size: usize,
    /// Number of backoff retries before a batch is declared permanently failed
    pub max_retries: u32,
    /// Backoff base: attempt `n` waits `base_delay * 2^n`
    pub base_delay: Duration,
    /// Save the checkpoint every N successfully processed batches
    ///
    /// `1` checkpoints after every batch (strongest recovery guarantee);
    /// larger values trade recovery granularity for fewer writes.
    pub checkpoint_interval: u64,
    /// Route permanently failed batches to the dead letter sink
    ///
    /// When disabled, terminal failures are logged and counted only.
    pub enable_dead_letter: bool,
    /// Root directory for per-identity durable state (checkpoint + DLQ)
    pub data_dir: PathBuf,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            checkpoint_interval: 1,
            enable_dead_letter: true,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl ConsumerConfig {
    /// Validate the configuration
    ///
    /// # Errors
    /// Returns a `ConfigError` describing the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        if self.base_delay.is_zero() {
            return Err(ConfigError::InvalidBaseDelay);
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::InvalidCheckpointInterval(
                self.checkpoint_interval,
            ));
        }
        if self.max_retries > MAX_RETRY_LIMIT {
            return Err(ConfigError::RetryLimitExceeded {
                requested: self.max_retries,
                limit: MAX_RETRY_LIMIT,
            });
        }
        Ok(())
    }
}

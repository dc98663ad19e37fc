//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use unblock_core::ConfigValidationError;

/// Reactive target sync configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Bounded work queue capacity; the oldest key is dropped on overflow (default: 256)
    pub queue_capacity: usize,

    /// Delivery attempts per item before it is dropped (default: 30)
    pub max_attempts: u32,

    /// Lifetime of an item from its latest observation, in milliseconds (default: 10000)
    pub event_ttl_ms: u64,

    /// First retry delay in milliseconds (default: 50)
    pub base_backoff_ms: u64,

    /// Retry delay cap in milliseconds (default: 400)
    pub max_backoff_ms: u64,

    /// Longest pause when the queue head is not yet eligible, in milliseconds (default: 10)
    pub idle_pause_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_attempts: 30,
            event_ttl_ms: 10_000,
            base_backoff_ms: 50,
            max_backoff_ms: 400,
            idle_pause_ms: 10,
        }
    }
}

impl SyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let invalid = |field: &str, message: &str| ConfigValidationError::InvalidValue {
            field: format!("sync.{}", field),
            message: message.to_string(),
        };

        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be greater than 0"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be greater than 0"));
        }
        if self.event_ttl_ms == 0 {
            return Err(invalid("event_ttl_ms", "must be greater than 0"));
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(invalid("base_backoff_ms", "must not exceed max_backoff_ms"));
        }
        if self.idle_pause_ms == 0 {
            return Err(invalid("idle_pause_ms", "must be greater than 0"));
        }
        Ok(())
    }

    pub fn event_ttl(&self) -> Duration {
        Duration::from_millis(self.event_ttl_ms)
    }

    pub fn idle_pause(&self) -> Duration {
        Duration::from_millis(self.idle_pause_ms)
    }

    /// Delay before the next attempt after `failed_attempts` failures:
    /// base, 2*base, 4*base, ... capped at `max_backoff_ms`.
    pub fn backoff_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        let millis = self
            .base_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

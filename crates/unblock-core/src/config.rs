//! Core configuration
//!
//! Tunables for strategy ranking, feedback retention and recommendation
//! deduplication. Every struct deserializes with per-field defaults so a
//! partial `config.toml` section is enough.

use serde::{Deserialize, Serialize};

/// Strategy selector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Observations required before feedback affects ranking (default: 5)
    pub min_samples_to_affect_ranking: u32,

    /// Maximum absolute priority boost derived from feedback (default: 15)
    pub max_priority_boost_abs: i32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_samples_to_affect_ranking: 5,
            // 15 is enough to flip a 10 point base priority gap on sustained success
            max_priority_boost_abs: 15,
        }
    }
}

/// Feedback store retention configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackStoreConfig {
    /// Entry TTL in seconds, measured from the last update. 0 disables TTL (default: 30 days)
    pub entry_ttl_secs: u64,

    /// Maximum number of (diagnosis, strategy) keys. 0 disables the cap (default: 512)
    pub max_entries: usize,
}

impl Default for FeedbackStoreConfig {
    fn default() -> Self {
        Self {
            entry_ttl_secs: 30 * 24 * 60 * 60,
            max_entries: 512,
        }
    }
}

/// Recommendation formatter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    /// Cooldown for identical per-host recommendations in seconds (default: 60)
    pub dedup_cooldown_secs: u64,

    /// Maximum length of the first explanation note in characters (default: 90)
    pub max_note_chars: usize,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            dedup_cooldown_secs: 60,
            max_note_chars: 90,
        }
    }
}

impl SelectorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_priority_boost_abs < 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "selector.max_priority_boost_abs".into(),
                message: "must not be negative".into(),
            });
        }
        Ok(())
    }
}

/// Longest accepted feedback TTL (100 years).
const MAX_FEEDBACK_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

impl FeedbackStoreConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.entry_ttl_secs > MAX_FEEDBACK_TTL_SECS {
            return Err(ConfigValidationError::InvalidValue {
                field: "feedback.entry_ttl_secs".into(),
                message: format!("must not exceed {} (0 disables expiry)", MAX_FEEDBACK_TTL_SECS),
            });
        }
        Ok(())
    }
}

impl FormatterConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_note_chars < 2 {
            return Err(ConfigValidationError::InvalidValue {
                field: "formatter.max_note_chars".into(),
                message: "must be at least 2".into(),
            });
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

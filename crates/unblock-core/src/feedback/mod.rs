//! Strategy feedback
//!
//! Success/failure statistics per (diagnosis, strategy) pair. The selector only
//! reads them through [`FeedbackSource`]; whoever observes the outcome of an
//! applied plan writes them through [`FeedbackStore`].

mod file;
mod memory;

pub use file::JsonFileFeedbackStore;
pub use memory::InMemoryFeedbackStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::types::{DiagnosisId, StrategyId};

/// Key of one statistics entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedbackKey {
    pub diagnosis_id: DiagnosisId,
    pub strategy_id: StrategyId,
}

impl FeedbackKey {
    pub fn new(diagnosis_id: DiagnosisId, strategy_id: StrategyId) -> Self {
        Self {
            diagnosis_id,
            strategy_id,
        }
    }
}

impl fmt::Display for FeedbackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.diagnosis_id, self.strategy_id)
    }
}

/// Aggregated outcomes for one key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub success_count: u64,
    pub failure_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl FeedbackStats {
    pub fn new(success_count: u64, failure_count: u64, last_updated: DateTime<Utc>) -> Self {
        Self {
            success_count,
            failure_count,
            last_updated,
        }
    }

    pub fn total_count(&self) -> u64 {
        self.success_count.saturating_add(self.failure_count)
    }

    /// Share of successes in [0, 1]; 0 when nothing was recorded.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_count();
        if total == 0 {
            0.0
        } else {
            self.success_count as f64 / total as f64
        }
    }
}

/// Observed outcome of applying a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyOutcome {
    Success,
    Failure,
    /// Not attributable; never recorded
    Unknown,
}

impl StrategyOutcome {
    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" | "ok" => Ok(StrategyOutcome::Success),
            "failure" | "fail" => Ok(StrategyOutcome::Failure),
            "unknown" => Ok(StrategyOutcome::Unknown),
            _ => Err(Error::UnknownOutcome(s.to_string())),
        }
    }
}

/// Read-only access to feedback statistics.
pub trait FeedbackSource: Send + Sync {
    /// Statistics for `key`, if any were recorded.
    fn try_get_stats(&self, key: &FeedbackKey) -> Option<FeedbackStats>;
}

/// Read/write feedback storage.
pub trait FeedbackStore: FeedbackSource {
    /// Record one outcome. `Unknown` outcomes are ignored.
    fn record(&self, key: FeedbackKey, outcome: StrategyOutcome, at: DateTime<Utc>);

    /// Apply retention (TTL, then entry cap). Returns the number of removed entries.
    fn prune(&self, now: DateTime<Utc>) -> usize;

    /// All entries ordered by key.
    fn entries(&self) -> Vec<(FeedbackKey, FeedbackStats)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_derivations() {
        let now = Utc::now();
        let empty = FeedbackStats::new(0, 0, now);
        assert_eq!(empty.total_count(), 0);
        assert_eq!(empty.success_rate(), 0.0);

        let stats = FeedbackStats::new(3, 1, now);
        assert_eq!(stats.total_count(), 4);
        assert!((stats.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_outcome_parse() {
        assert_eq!(StrategyOutcome::parse("Success").unwrap(), StrategyOutcome::Success);
        assert_eq!(StrategyOutcome::parse("FAIL").unwrap(), StrategyOutcome::Failure);
        assert_eq!(StrategyOutcome::parse("unknown").unwrap(), StrategyOutcome::Unknown);
        assert!(StrategyOutcome::parse("maybe").unwrap_err().is_unknown_identifier());
    }

    #[test]
    fn test_key_ordering_and_display() {
        let a = FeedbackKey::new(DiagnosisId::SilentDrop, StrategyId::TlsFragment);
        let b = FeedbackKey::new(DiagnosisId::SilentDrop, StrategyId::DropRst);
        let c = FeedbackKey::new(DiagnosisId::DnsHijack, StrategyId::UseDoh);
        let mut keys = vec![c, b, a];
        keys.sort();
        assert_eq!(keys, vec![a, b, c]);
        assert_eq!(a.to_string(), "SilentDrop/TlsFragment");
    }
}

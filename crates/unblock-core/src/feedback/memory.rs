//! In-memory feedback store.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::debug;

use super::{FeedbackKey, FeedbackSource, FeedbackStats, FeedbackStore, StrategyOutcome};
use crate::config::FeedbackStoreConfig;
use crate::store::KeyedStore;

/// Feedback statistics held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryFeedbackStore {
    entries: KeyedStore<FeedbackKey, FeedbackStats>,
    config: FeedbackStoreConfig,
}

impl InMemoryFeedbackStore {
    pub fn new(config: FeedbackStoreConfig) -> Self {
        Self {
            entries: KeyedStore::new(),
            config,
        }
    }

    /// Seed the store with existing entries, e.g. loaded from disk.
    pub fn with_entries(
        config: FeedbackStoreConfig,
        entries: impl IntoIterator<Item = (FeedbackKey, FeedbackStats)>,
    ) -> Self {
        let store = Self::new(config);
        for (key, stats) in entries {
            store.entries.insert(key, stats);
        }
        store
    }

    pub fn config(&self) -> &FeedbackStoreConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FeedbackSource for InMemoryFeedbackStore {
    fn try_get_stats(&self, key: &FeedbackKey) -> Option<FeedbackStats> {
        self.entries.get(key)
    }
}

impl FeedbackStore for InMemoryFeedbackStore {
    fn record(&self, key: FeedbackKey, outcome: StrategyOutcome, at: DateTime<Utc>) {
        if outcome == StrategyOutcome::Unknown {
            return;
        }

        self.entries.with_entry(key, |entry| {
            let stats = entry.or_insert_with(|| FeedbackStats::new(0, 0, at));
            match outcome {
                StrategyOutcome::Success => {
                    stats.success_count = stats.success_count.saturating_add(1)
                }
                StrategyOutcome::Failure => {
                    stats.failure_count = stats.failure_count.saturating_add(1)
                }
                StrategyOutcome::Unknown => {}
            }
            stats.last_updated = at;
        });
        self.prune(at);
    }

    fn prune(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();

        if self.config.entry_ttl_secs > 0 {
            let ttl = i64::try_from(self.config.entry_ttl_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX);
            self.entries
                .retain(|_, stats| now.signed_duration_since(stats.last_updated) <= ttl);
        }

        let max = self.config.max_entries;
        if max > 0 && self.entries.len() > max {
            let mut ordered = self.entries.snapshot();
            ordered.sort_by(|(ka, sa), (kb, sb)| {
                sa.last_updated.cmp(&sb.last_updated).then_with(|| ka.cmp(kb))
            });
            let excess = ordered.len().saturating_sub(max);
            let evicted: HashSet<FeedbackKey> =
                ordered.into_iter().take(excess).map(|(k, _)| k).collect();
            self.entries.retain(|key, _| !evicted.contains(key));
        }

        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Pruned feedback entries");
        }
        removed
    }

    fn entries(&self) -> Vec<(FeedbackKey, FeedbackStats)> {
        let mut entries = self.entries.snapshot();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }
}

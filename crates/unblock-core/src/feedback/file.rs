//! JSON file backed feedback store.
//!
//! The file is rewritten in full after every change, written to a sibling
//! temp file first and then renamed over the target. Persistence is
//! best-effort: failures are logged and the in-memory state stays
//! authoritative for the life of the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{
    FeedbackKey, FeedbackSource, FeedbackStats, FeedbackStore, InMemoryFeedbackStore,
    StrategyOutcome,
};
use crate::config::FeedbackStoreConfig;
use crate::error::{Error, Result};
use crate::types::{DiagnosisId, StrategyId};

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct FeedbackFile {
    schema_version: u32,
    #[serde(default)]
    entries: Vec<FeedbackRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FeedbackRecord {
    diagnosis_id: DiagnosisId,
    strategy_id: StrategyId,
    success_count: u64,
    failure_count: u64,
    last_updated: DateTime<Utc>,
}

/// Feedback store persisted as a single JSON document.
#[derive(Debug)]
pub struct JsonFileFeedbackStore {
    path: PathBuf,
    inner: InMemoryFeedbackStore,
}

impl JsonFileFeedbackStore {
    /// Open the store at `path`.
    ///
    /// A missing file yields an empty store. An unreadable or corrupt file also
    /// yields an empty store, with a warning; it is overwritten on the next save.
    /// Retention is applied to the loaded entries, and the file is rewritten
    /// when that removes anything.
    pub fn open(path: impl Into<PathBuf>, config: FeedbackStoreConfig) -> Self {
        let path = path.into();
        let inner = match load(&path) {
            Ok(Some(entries)) => {
                debug!(path = %path.display(), entries = entries.len(), "Loaded feedback store");
                InMemoryFeedbackStore::with_entries(config, entries)
            }
            Ok(None) => InMemoryFeedbackStore::new(config),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable feedback store");
                InMemoryFeedbackStore::new(config)
            }
        };

        let store = Self { path, inner };
        if store.inner.prune(Utc::now()) > 0 {
            store.save_best_effort();
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current state to disk.
    pub fn save(&self) -> Result<()> {
        let document = FeedbackFile {
            schema_version: SCHEMA_VERSION,
            entries: self
                .inner
                .entries()
                .into_iter()
                .map(|(key, stats)| FeedbackRecord {
                    diagnosis_id: key.diagnosis_id,
                    strategy_id: key.strategy_id,
                    success_count: stats.success_count,
                    failure_count: stats.failure_count,
                    last_updated: stats.last_updated,
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn save_best_effort(&self) {
        if let Err(e) = self.save() {
            warn!(path = %self.path.display(), error = %e, "Failed to persist feedback store");
        }
    }
}

fn load(path: &Path) -> Result<Option<Vec<(FeedbackKey, FeedbackStats)>>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let document: FeedbackFile = serde_json::from_str(&contents)?;
    if document.schema_version != SCHEMA_VERSION {
        return Err(Error::Other(format!(
            "unsupported feedback schema version {} (expected {})",
            document.schema_version, SCHEMA_VERSION
        )));
    }

    Ok(Some(
        document
            .entries
            .into_iter()
            .map(|r| {
                (
                    FeedbackKey::new(r.diagnosis_id, r.strategy_id),
                    FeedbackStats::new(r.success_count, r.failure_count, r.last_updated),
                )
            })
            .collect(),
    ))
}

impl FeedbackSource for JsonFileFeedbackStore {
    fn try_get_stats(&self, key: &FeedbackKey) -> Option<FeedbackStats> {
        self.inner.try_get_stats(key)
    }
}

impl FeedbackStore for JsonFileFeedbackStore {
    fn record(&self, key: FeedbackKey, outcome: StrategyOutcome, at: DateTime<Utc>) {
        if outcome == StrategyOutcome::Unknown {
            return;
        }
        self.inner.record(key, outcome, at);
        self.save_best_effort();
    }

    fn prune(&self, now: DateTime<Utc>) -> usize {
        let removed = self.inner.prune(now);
        if removed > 0 {
            self.save_best_effort();
        }
        removed
    }

    fn entries(&self) -> Vec<(FeedbackKey, FeedbackStats)> {
        self.inner.entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> FeedbackKey {
        FeedbackKey::new(DiagnosisId::TlsInterference, StrategyId::TlsDisorder)
    }

    #[test]
    fn test_roundtrip_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("feedback.json");
        let now = Utc::now();

        {
            let store = JsonFileFeedbackStore::open(&path, FeedbackStoreConfig::default());
            store.record(key(), StrategyOutcome::Success, now);
            store.record(key(), StrategyOutcome::Failure, now);
        }
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = JsonFileFeedbackStore::open(&path, FeedbackStoreConfig::default());
        let stats = reopened.try_get_stats(&key()).unwrap();
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 1);
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.json");
        let store = JsonFileFeedbackStore::open(&path, FeedbackStoreConfig::default());
        store.record(key(), StrategyOutcome::Success, Utc::now());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["schema_version"], 1);
        assert_eq!(raw["entries"][0]["diagnosis_id"], "TlsInterference");
        assert_eq!(raw["entries"][0]["strategy_id"], "TlsDisorder");
        assert_eq!(raw["entries"][0]["success_count"], 1);
    }

    #[test]
    fn test_corrupt_file_yields_empty_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonFileFeedbackStore::open(&path, FeedbackStoreConfig::default());
        assert!(store.entries().is_empty());

        store.record(key(), StrategyOutcome::Success, Utc::now());
        let reopened = JsonFileFeedbackStore::open(&path, FeedbackStoreConfig::default());
        assert_eq!(reopened.entries().len(), 1);
    }

    #[test]
    fn test_unknown_schema_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.json");
        fs::write(&path, r#"{"schema_version": 99, "entries": []}"#).unwrap();

        let store = JsonFileFeedbackStore::open(&path, FeedbackStoreConfig::default());
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_open_drops_expired_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.json");
        let stale = Utc::now() - chrono::Duration::days(60);
        let fresh_key = FeedbackKey::new(DiagnosisId::SilentDrop, StrategyId::DropRst);

        {
            let store = JsonFileFeedbackStore::open(
                &path,
                FeedbackStoreConfig {
                    entry_ttl_secs: 0,
                    max_entries: 0,
                },
            );
            for _ in 0..10 {
                store.record(key(), StrategyOutcome::Success, stale);
            }
            store.record(fresh_key, StrategyOutcome::Success, Utc::now());
        }

        let reopened = JsonFileFeedbackStore::open(&path, FeedbackStoreConfig::default());
        assert!(reopened.try_get_stats(&key()).is_none());
        assert!(reopened.try_get_stats(&fresh_key).is_some());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["entries"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileFeedbackStore::open(dir.path().join("absent.json"), FeedbackStoreConfig::default());
        assert!(store.entries().is_empty());
        assert!(!store.path().exists());
    }
}

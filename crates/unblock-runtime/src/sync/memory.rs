//! In-memory execution state.
//!
//! A self-contained [`SelectiveTargetSync`] implementation: every delivered
//! (host, ip) pair is remembered, and the UDP/443 drop list is rebuilt as the
//! sorted union of IPv4 addresses observed for all active hosts. Used by the
//! CLI simulator and as a reference for real state managers.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use unblock_core::KeyedStore;

use super::{SelectiveTargetSync, SyncOutcome};
use crate::error::Result;

/// Upper bound on the UDP/443 drop list.
pub const MAX_DROP_TARGETS: usize = 32;

#[derive(Debug, Default)]
pub struct InMemoryTargetState {
    observed: KeyedStore<String, BTreeSet<Ipv4Addr>>,
    active_hosts: RwLock<HashSet<String>>,
    drop_targets: RwLock<Vec<Ipv4Addr>>,
    policy_driven: AtomicBool,
    deliveries: AtomicU64,
}

impl InMemoryTargetState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also report policy snapshot rebuilds.
    pub fn with_policy_driven(self, enabled: bool) -> Self {
        self.policy_driven.store(enabled, Ordering::Relaxed);
        self
    }

    /// Current UDP/443 drop list, sorted ascending.
    pub fn drop_targets(&self) -> Vec<Ipv4Addr> {
        self.drop_targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// IPv4 addresses observed for `host`, sorted ascending.
    pub fn observed_for(&self, host: &str) -> Vec<Ipv4Addr> {
        self.observed
            .get(&host.trim().to_lowercase())
            .map(|ips| ips.into_iter().collect())
            .unwrap_or_default()
    }

    /// Stop targeting `host`; returns false if it was not active.
    pub fn deactivate(&self, host: &str) -> bool {
        let removed = self
            .active_hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&host.trim().to_lowercase());
        if removed {
            self.rebuild();
        }
        removed
    }

    /// Number of accepted deliveries
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    /// Rebuild the drop list; returns true if it changed.
    fn rebuild(&self) -> bool {
        let hosts: Vec<String> = self
            .active_hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();

        let mut union = BTreeSet::new();
        for host in hosts {
            if let Some(ips) = self.observed.get(&host) {
                union.extend(ips);
            }
        }
        let targets: Vec<Ipv4Addr> = union.into_iter().take(MAX_DROP_TARGETS).collect();

        let mut current = self
            .drop_targets
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if *current == targets {
            return false;
        }
        *current = targets;
        true
    }
}

#[async_trait]
impl SelectiveTargetSync for InMemoryTargetState {
    async fn try_sync_selective_targets(&self, target_key: &str, ip: IpAddr) -> Result<SyncOutcome> {
        let host = target_key.trim().to_lowercase();
        let IpAddr::V4(ipv4) = ip else {
            // The drop list is IPv4 only.
            return Ok(SyncOutcome::default());
        };
        if host.is_empty() || ipv4.is_unspecified() {
            return Ok(SyncOutcome::default());
        }

        self.observed.with_entry(host.clone(), |entry| {
            entry.or_default().insert(ipv4);
        });
        self.active_hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.clone());

        let changed = self.rebuild();
        let delivered = !self.drop_targets().is_empty();
        if delivered {
            self.deliveries.fetch_add(1, Ordering::Relaxed);
        }
        debug!(host = %host, ip = %ipv4, changed, "Applied selective UDP/443 targets");

        Ok(SyncOutcome {
            legacy_targets_delivered: delivered,
            policy_snapshot_updated: changed && self.policy_driven.load(Ordering::Relaxed),
        })
    }
}

//! Reactive target synchronization
//!
//! Runtime observations (for example "UDP/443 to this IP is being dropped")
//! are pushed into an externally owned execution state. Producers never block
//! and never see delivery failures: observations are coalesced per
//! (kind, target, ip), queued in a bounded queue and delivered by a single
//! worker task with bounded retries.

mod memory;
mod queue;
mod service;

pub use memory::InMemoryTargetState;
pub use service::ReactiveTargetSync;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

use crate::error::Result;

/// Kind of runtime observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    UdpBlockage,
    TlsInterference,
    EndpointMismatch,
}

impl fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEventKind::UdpBlockage => write!(f, "udp_blockage"),
            SyncEventKind::TlsInterference => write!(f, "tls_interference"),
            SyncEventKind::EndpointMismatch => write!(f, "endpoint_mismatch"),
        }
    }
}

/// Identity of a pending work item. Target keys compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncKey {
    pub kind: SyncEventKind,
    target_key: String,
    pub ip: IpAddr,
}

impl SyncKey {
    pub fn new(kind: SyncEventKind, target_key: &str, ip: IpAddr) -> Self {
        Self {
            kind,
            target_key: target_key.trim().to_lowercase(),
            ip,
        }
    }

    /// Normalized (trimmed, lowercased) target key
    pub fn target_key(&self) -> &str {
        &self.target_key
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.kind, self.target_key, self.ip)
    }
}

/// Work item awaiting delivery
#[derive(Debug, Clone)]
pub struct PendingSyncItem {
    pub key: SyncKey,
    /// Failed delivery attempts so far
    pub attempts: u32,
    pub next_eligible: Instant,
    pub deadline: Instant,
    /// Whether the key currently sits in the work queue
    pub(crate) queued: bool,
}

impl PendingSyncItem {
    pub(crate) fn new(key: SyncKey, now: Instant, deadline: Instant) -> Self {
        Self {
            key,
            attempts: 0,
            next_eligible: now,
            deadline,
            queued: false,
        }
    }

    /// Fold a repeated observation into this item.
    pub(crate) fn coalesce(&mut self, now: Instant, deadline: Instant) {
        self.deadline = self.deadline.max(deadline);
        self.next_eligible = self.next_eligible.min(now);
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }
}

/// Execution-state context at the time of an observation
#[derive(Debug, Clone, Default)]
pub struct SyncContext {
    pub quic_fallback_enabled: bool,
    /// QUIC fallback already applies to all traffic; nothing to target
    pub quic_fallback_global: bool,
    pub primary_target: Option<String>,
    pub secondary_target: Option<String>,
}

impl SyncContext {
    /// Selective QUIC fallback for the given targets.
    pub fn selective(primary: impl Into<String>, secondary: Option<String>) -> Self {
        Self {
            quic_fallback_enabled: true,
            quic_fallback_global: false,
            primary_target: Some(primary.into()),
            secondary_target: secondary,
        }
    }

    /// Non-empty target keys; the secondary is dropped when it equals the
    /// primary case-insensitively.
    pub fn target_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::with_capacity(2);
        for key in [&self.primary_target, &self.secondary_target]
            .into_iter()
            .flatten()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
        {
            if !keys.iter().any(|existing| existing.eq_ignore_ascii_case(key)) {
                keys.push(key);
            }
        }
        keys
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub legacy_targets_delivered: bool,
    pub policy_snapshot_updated: bool,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.legacy_targets_delivered || self.policy_snapshot_updated
    }
}

/// The external execution-state operation consumed by the sync service.
///
/// Called from a single worker task only, but must be idempotent: the same
/// (target, ip) pair may be delivered more than once.
#[async_trait]
pub trait SelectiveTargetSync: Send + Sync {
    async fn try_sync_selective_targets(&self, target_key: &str, ip: IpAddr) -> Result<SyncOutcome>;
}

/// Counters kept by the sync service
#[derive(Debug, Default)]
pub struct SyncStats {
    observed: AtomicU64,
    coalesced: AtomicU64,
    delivered: AtomicU64,
    expired: AtomicU64,
    exhausted: AtomicU64,
    failed_attempts: AtomicU64,
    overflow_dropped: AtomicU64,
}

/// Point-in-time copy of [`SyncStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatsSnapshot {
    pub observed: u64,
    pub coalesced: u64,
    pub delivered: u64,
    pub expired: u64,
    pub exhausted: u64,
    pub failed_attempts: u64,
    pub overflow_dropped: u64,
}

impl SyncStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            observed: self.observed.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            overflow_dropped: self.overflow_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sync_key_normalizes_target() {
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let a = SyncKey::new(SyncEventKind::UdpBlockage, "  Example.COM ", ip);
        let b = SyncKey::new(SyncEventKind::UdpBlockage, "example.com", ip);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "udp_blockage|example.com|203.0.113.7");
    }

    #[test]
    fn test_target_keys() {
        let ctx = SyncContext::selective("Example.com", Some("example.COM".into()));
        assert_eq!(ctx.target_keys(), vec!["Example.com"]);

        let ctx = SyncContext::selective(" a.example ", Some("b.example".into()));
        assert_eq!(ctx.target_keys(), vec!["a.example", "b.example"]);

        let ctx = SyncContext::selective("   ", Some("b.example".into()));
        assert_eq!(ctx.target_keys(), vec!["b.example"]);

        assert!(SyncContext::default().target_keys().is_empty());
    }

    #[test]
    fn test_coalesce_widens_window() {
        let now = Instant::now();
        let ip: IpAddr = "198.51.100.1".parse().unwrap();
        let mut item = PendingSyncItem::new(
            SyncKey::new(SyncEventKind::UdpBlockage, "h", ip),
            now,
            now + Duration::from_secs(10),
        );
        item.next_eligible = now + Duration::from_millis(400);

        item.coalesce(now + Duration::from_millis(5), now + Duration::from_secs(3));
        assert_eq!(item.deadline, now + Duration::from_secs(10));
        assert_eq!(item.next_eligible, now + Duration::from_millis(5));

        item.coalesce(now + Duration::from_millis(6), now + Duration::from_secs(12));
        assert_eq!(item.deadline, now + Duration::from_secs(12));
        assert_eq!(item.next_eligible, now + Duration::from_millis(5));
    }

    #[test]
    fn test_outcome_success() {
        assert!(!SyncOutcome::default().is_success());
        assert!(SyncOutcome { legacy_targets_delivered: true, policy_snapshot_updated: false }.is_success());
        assert!(SyncOutcome { legacy_targets_delivered: false, policy_snapshot_updated: true }.is_success());
    }
}

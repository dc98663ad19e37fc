//! Capability registry
//!
//! The execution layer publishes which strategies it can actually apply. The
//! selector never recommends anything outside this set, so reserved
//! identifiers stay dormant until the execution side marks them implemented.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use crate::types::StrategyId;

/// Strategies implemented out of the box.
pub const DEFAULT_IMPLEMENTED: [StrategyId; 6] = [
    StrategyId::TlsDisorder,
    StrategyId::TlsFragment,
    StrategyId::DropRst,
    StrategyId::UseDoh,
    StrategyId::HttpHostTricks,
    StrategyId::BadChecksum,
];

/// Identifiers that exist in the catalog but have no executor yet.
pub const RESERVED: [StrategyId; 3] = [
    StrategyId::TlsFakeTtl,
    StrategyId::QuicObfuscation,
    StrategyId::AggressiveFragment,
];

/// Shared, thread-safe set of implemented strategies.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    implemented: RwLock<BTreeSet<StrategyId>>,
}

impl CapabilityRegistry {
    /// Empty registry: nothing is recommendable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with [`DEFAULT_IMPLEMENTED`].
    pub fn with_defaults() -> Self {
        Self::from_ids(DEFAULT_IMPLEMENTED)
    }

    pub fn from_ids(ids: impl IntoIterator<Item = StrategyId>) -> Self {
        Self {
            implemented: RwLock::new(ids.into_iter().collect()),
        }
    }

    /// Mark a strategy as implemented. Returns false if it already was.
    pub fn mark_implemented(&self, id: StrategyId) -> bool {
        let added = self
            .implemented
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        if added {
            info!(strategy = %id, "Strategy marked implemented");
        }
        added
    }

    /// Withdraw a strategy. Returns false if it was not implemented.
    pub fn revoke(&self, id: StrategyId) -> bool {
        let removed = self
            .implemented
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed {
            info!(strategy = %id, "Strategy revoked");
        }
        removed
    }

    pub fn is_implemented(&self, id: StrategyId) -> bool {
        self.implemented
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    /// Implemented strategies in catalog order.
    pub fn snapshot(&self) -> Vec<StrategyId> {
        self.implemented
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }
}

//! unblock-runtime - Runtime adaptation for unblock
//!
//! Propagates runtime observations into the externally owned execution state
//! without blocking the code that makes them:
//!
//! - **sync**: coalescing queue, retrying worker and the target-state trait
//! - **config**: queue, retry and TTL tunables

pub mod config;
pub mod error;
pub mod sync;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use sync::{
    InMemoryTargetState, PendingSyncItem, ReactiveTargetSync, SelectiveTargetSync, SyncContext,
    SyncEventKind, SyncKey, SyncOutcome, SyncStatsSnapshot,
};

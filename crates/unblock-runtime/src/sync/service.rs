//! ReactiveTargetSync - coalescing delivery of runtime observations
//!
//! Architecture:
//! - Producers call synchronous `on_*` methods from any thread; they only
//!   touch the pending map and the bounded queue, then wake the worker.
//! - The pending map is authoritative. The queue only carries keys; a key
//!   evicted on overflow is recovered by the next observation, a nudge, or
//!   the worker's idle reconciliation pass.
//! - One worker task delivers items with bounded retries. A supervisor task
//!   awaits it and records whether it is still alive.

use std::collections::hash_map::Entry;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use unblock_core::KeyedStore;

use super::queue::SyncQueue;
use super::{
    PendingSyncItem, SelectiveTargetSync, SyncContext, SyncEventKind, SyncKey, SyncStats,
    SyncStatsSnapshot,
};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

/// State shared between producers and the worker
struct Shared {
    config: SyncConfig,
    target: Arc<dyn SelectiveTargetSync>,
    pending: KeyedStore<SyncKey, PendingSyncItem>,
    queue: SyncQueue,
    notify: Notify,
    stats: SyncStats,
    accepting: AtomicBool,
    worker_alive: AtomicBool,
}

/// What the worker should do with a popped key
enum Step {
    Gone,
    Expired,
    Wait(Duration),
    Attempt,
}

/// Handle to the running sync service.
///
/// Dropping the handle signals shutdown; use [`Self::shutdown_and_wait`] to
/// also join the worker.
pub struct ReactiveTargetSync {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ReactiveTargetSync {
    /// Validate `config` and start the worker on the current Tokio runtime.
    pub fn spawn(config: SyncConfig, target: Arc<dyn SelectiveTargetSync>) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;

        let shared = Arc::new(Shared {
            queue: SyncQueue::new(config.queue_capacity),
            config,
            target,
            pending: KeyedStore::new(),
            notify: Notify::new(),
            stats: SyncStats::default(),
            accepting: AtomicBool::new(true),
            worker_alive: AtomicBool::new(true),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = runtime.spawn(run_worker(Arc::clone(&shared), shutdown_rx));
        let supervised = Arc::clone(&shared);
        let supervisor = runtime.spawn(async move {
            match worker.await {
                Ok(()) => info!("Reactive target sync worker stopped"),
                Err(e) if e.is_panic() => {
                    error!(error = %e, "Reactive target sync worker panicked")
                }
                Err(e) => error!(error = %e, "Reactive target sync worker aborted"),
            }
            supervised.accepting.store(false, Ordering::SeqCst);
            supervised.worker_alive.store(false, Ordering::SeqCst);
        });

        info!(
            queue_capacity = shared.config.queue_capacity,
            max_attempts = shared.config.max_attempts,
            event_ttl_ms = shared.config.event_ttl_ms,
            "Reactive target sync started"
        );

        Ok(Self {
            shared,
            shutdown_tx,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    /// UDP/443 to `ip` is being dropped for the context's targets.
    ///
    /// No-op when QUIC fallback is disabled or already global.
    pub fn on_udp_blockage(&self, ip: IpAddr, context: &SyncContext) {
        if !context.quic_fallback_enabled || context.quic_fallback_global {
            return;
        }
        for target_key in context.target_keys() {
            self.observe(SyncKey::new(SyncEventKind::UdpBlockage, target_key, ip));
        }
    }

    /// Reserved: TLS interference does not change execution state yet.
    pub fn on_tls_interference(&self, host: &str, context: &SyncContext) {
        let _ = (host, context);
    }

    /// Reserved: endpoint changes do not change execution state yet.
    pub fn on_endpoint_mismatch(&self, old_target: &str, new_target: &str, context: &SyncContext) {
        let _ = (old_target, new_target, context);
    }

    /// Make every pending item eligible immediately.
    pub fn nudge(&self) {
        if !self.is_accepting() {
            return;
        }

        let now = Instant::now();
        let mut requeue = Vec::new();
        self.shared.pending.for_each_mut(|key, item| {
            item.next_eligible = now;
            if !item.queued {
                item.queued = true;
                requeue.push(key.clone());
            }
        });

        debug!(requeued = requeue.len(), "Nudged pending sync items");
        for key in requeue {
            enqueue(&self.shared, key);
        }
        self.shared.notify.notify_one();
    }

    /// Stop accepting work and signal the worker. An in-flight delivery
    /// attempt still completes.
    pub fn shutdown(&self) {
        if self.shared.accepting.swap(false, Ordering::SeqCst) {
            info!(pending = self.shared.pending.len(), "Reactive target sync shutting down");
        }
        self.shutdown_tx.send_replace(true);
    }

    /// [`Self::shutdown`] and wait for the worker to exit.
    pub async fn shutdown_and_wait(&self) {
        self.shutdown();
        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(supervisor) = supervisor {
            if let Err(e) = supervisor.await {
                warn!(error = %e, "Reactive target sync supervisor failed");
            }
        }
    }

    pub fn is_worker_alive(&self) -> bool {
        self.shared.worker_alive.load(Ordering::SeqCst)
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Copy of all pending items. Order is unspecified.
    pub fn pending_snapshot(&self) -> Vec<PendingSyncItem> {
        self.shared
            .pending
            .snapshot()
            .into_iter()
            .map(|(_, item)| item)
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.pending.len()
    }

    pub fn stats(&self) -> SyncStatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    fn observe(&self, key: SyncKey) {
        if !self.is_accepting() {
            return;
        }

        let shared = &self.shared;
        let now = Instant::now();
        let deadline = now + shared.config.event_ttl();
        SyncStats::bump(&shared.stats.observed);

        let needs_enqueue = shared.pending.with_entry(key.clone(), |entry| match entry {
            Entry::Occupied(mut existing) => {
                SyncStats::bump(&shared.stats.coalesced);
                let item = existing.get_mut();
                item.coalesce(now, deadline);
                !std::mem::replace(&mut item.queued, true)
            }
            Entry::Vacant(slot) => {
                let mut item = PendingSyncItem::new(key.clone(), now, deadline);
                item.queued = true;
                slot.insert(item);
                true
            }
        });

        if needs_enqueue {
            debug!(key = %key, "Queued sync item");
            enqueue(shared, key);
        }
        shared.notify.notify_one();
    }
}

impl Drop for ReactiveTargetSync {
    fn drop(&mut self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
    }
}

/// Push `key`, marking an evicted key as no longer queued.
fn enqueue(shared: &Shared, key: SyncKey) {
    if let Some(evicted) = shared.queue.push(key) {
        SyncStats::bump(&shared.stats.overflow_dropped);
        debug!(key = %evicted, "Sync queue full, dropped oldest key");
        shared.pending.update(&evicted, |item| item.queued = false);
    }
}

async fn run_worker(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    debug!("Reactive target sync worker running");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let Some(key) = shared.queue.pop() else {
            if reconcile(&shared) > 0 {
                continue;
            }
            tokio::select! {
                _ = shared.notify.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
            continue;
        };

        let step = shared.pending.with_entry(key.clone(), |entry| match entry {
            Entry::Vacant(_) => Step::Gone,
            Entry::Occupied(mut existing) => {
                let now = Instant::now();
                let item = existing.get_mut();
                if now >= item.deadline {
                    existing.remove();
                    Step::Expired
                } else if now < item.next_eligible {
                    Step::Wait(item.next_eligible - now)
                } else {
                    item.queued = false;
                    Step::Attempt
                }
            }
        });

        match step {
            Step::Gone => {}
            Step::Expired => {
                SyncStats::bump(&shared.stats.expired);
                debug!(key = %key, "Sync item expired");
            }
            Step::Wait(remaining) => {
                enqueue(&shared, key);
                let pause = remaining.min(shared.config.idle_pause());
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            Step::Attempt => attempt(&shared, key).await,
        }
    }

    debug!(pending = shared.pending.len(), "Reactive target sync worker exiting");
}

async fn attempt(shared: &Shared, key: SyncKey) {
    let result = shared
        .target
        .try_sync_selective_targets(key.target_key(), key.ip)
        .await;

    let delivered = match result {
        Ok(outcome) => outcome.is_success(),
        Err(e) => {
            debug!(key = %key, error = %e, "Sync attempt failed");
            false
        }
    };

    if delivered {
        shared.pending.remove(&key);
        SyncStats::bump(&shared.stats.delivered);
        debug!(key = %key, "Sync item delivered");
        return;
    }

    SyncStats::bump(&shared.stats.failed_attempts);
    let max_attempts = shared.config.max_attempts;
    let requeue = shared.pending.with_entry(key.clone(), |entry| {
        let Entry::Occupied(mut existing) = entry else {
            return false;
        };
        let item = existing.get_mut();
        item.attempts += 1;
        if item.attempts >= max_attempts {
            existing.remove();
            SyncStats::bump(&shared.stats.exhausted);
            debug!(key = %key, attempts = max_attempts, "Sync item dropped after max attempts");
            return false;
        }
        item.next_eligible = Instant::now() + shared.config.backoff_for(item.attempts);
        !std::mem::replace(&mut item.queued, true)
    });

    if requeue {
        enqueue(shared, key);
    }
}

/// Purge expired items and requeue items whose key was evicted from the queue.
/// Returns the number of requeued keys.
fn reconcile(shared: &Shared) -> usize {
    let now = Instant::now();
    let mut expired = 0u64;
    shared.pending.retain(|_, item| {
        let alive = now < item.deadline;
        if !alive {
            expired += 1;
        }
        alive
    });
    for _ in 0..expired {
        SyncStats::bump(&shared.stats.expired);
    }

    let mut orphans = Vec::new();
    shared.pending.for_each_mut(|key, item| {
        if !item.queued {
            item.queued = true;
            orphans.push(key.clone());
        }
    });

    if !orphans.is_empty() {
        debug!(orphans = orphans.len(), "Requeued orphaned sync items");
    }
    let requeued = orphans.len();
    for key in orphans {
        enqueue(shared, key);
    }
    requeued
}

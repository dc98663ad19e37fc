//! Bounded FIFO of pending sync keys.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::SyncKey;

/// Drop-oldest bounded queue.
#[derive(Debug)]
pub(crate) struct SyncQueue {
    keys: Mutex<VecDeque<SyncKey>>,
    capacity: usize,
}

impl SyncQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            keys: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Append `key`. Returns the evicted oldest key when the queue was full.
    pub(crate) fn push(&self, key: SyncKey) -> Option<SyncKey> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        let evicted = if keys.len() >= self.capacity {
            keys.pop_front()
        } else {
            None
        };
        keys.push_back(key);
        evicted
    }

    pub(crate) fn pop(&self) -> Option<SyncKey> {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

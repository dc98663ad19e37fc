//! Keyed store
//!
//! A small owned, thread-safe key-value map. Every instance is independent;
//! the recommendation formatter keeps one for its per-host dedup cache and the
//! sync service keeps one for pending work items.
//!
//! Locks are held only for the duration of a single call. A poisoned lock is
//! recovered rather than propagated: the map holds plain values, so a panic in
//! another caller cannot leave it half-updated.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe map with atomic per-key read-modify-write.
#[derive(Debug)]
pub struct KeyedStore<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for KeyedStore<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> KeyedStore<K, V>
where
    K: Eq + Hash,
{
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the entry for `key` under the write lock.
    ///
    /// This is the only primitive callers need for check-then-set: no other
    /// call can observe or modify the map while `f` runs.
    pub fn with_entry<R>(&self, key: K, f: impl FnOnce(Entry<'_, K, V>) -> R) -> R {
        let mut entries = self.write();
        f(entries.entry(key))
    }

    /// Insert a value, returning the previous one
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.write().insert(key, value)
    }

    /// Apply `f` to an existing value. Returns `None` if the key is absent.
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.write().get_mut(key).map(f)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.write().remove(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.read().contains_key(key)
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&self, keep: impl FnMut(&K, &mut V) -> bool) {
        self.write().retain(keep);
    }

    /// Mutate every entry in place.
    pub fn for_each_mut(&self, mut f: impl FnMut(&K, &mut V)) {
        for (key, value) in self.write().iter_mut() {
            f(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }
}

impl<K, V> KeyedStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Get a copy of the value for `key`
    pub fn get(&self, key: &K) -> Option<V> {
        self.read().get(key).cloned()
    }

    /// Copy out every entry. Order is unspecified.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_operations() {
        let store: KeyedStore<String, u32> = KeyedStore::new();
        assert!(store.is_empty());

        assert_eq!(store.insert("a".into(), 1), None);
        assert_eq!(store.insert("a".into(), 2), Some(1));
        assert_eq!(store.get(&"a".to_string()), Some(2));
        assert!(store.contains_key(&"a".to_string()));

        assert_eq!(store.update(&"a".to_string(), |v| {
            *v += 1;
            *v
        }), Some(3));
        assert_eq!(store.update(&"missing".to_string(), |v| *v), None);

        assert_eq!(store.remove(&"a".to_string()), Some(3));
        assert!(store.is_empty());
    }

    #[test]
    fn test_retain_and_snapshot() {
        let store = KeyedStore::new();
        for i in 0..10u32 {
            store.insert(i, i * 10);
        }
        store.retain(|k, _| k % 2 == 0);
        assert_eq!(store.len(), 5);

        let mut entries = store.snapshot();
        entries.sort();
        assert_eq!(entries[0], (0, 0));
        assert_eq!(entries[4], (8, 80));
    }

    #[test]
    fn test_with_entry_is_atomic_across_threads() {
        let store: Arc<KeyedStore<&'static str, u64>> = Arc::new(KeyedStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        store.with_entry("counter", |entry| {
                            *entry.or_insert(0) += 1;
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get(&"counter"), Some(8000));
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let store: Arc<KeyedStore<u8, u8>> = Arc::new(KeyedStore::new());
        store.insert(1, 1);

        let poisoner = Arc::clone(&store);
        let result = thread::spawn(move || {
            let _: () = poisoner.with_entry(2, |_| panic!("boom"));
        })
        .join();
        assert!(result.is_err());

        assert_eq!(store.get(&1), Some(1));
        store.insert(3, 3);
        assert_eq!(store.len(), 2);
    }
}

//! Capacity-bounded, durable, key-indexed collection.
//!
//! The whole set is re-serialized on every mutation; at the sizes involved
//! (tens of entries) that is simpler than incremental writes. A mutation whose
//! write fails is rolled back so memory and storage never disagree.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::{KeyValueStore, StorageError};
use crate::error::SyncError;

/// Items addressable by a string key.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Outcome of [`PersistentSet::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    Added,
    AlreadyPresent,
}

pub struct PersistentSet<T> {
    items: Vec<T>,
    capacity: usize,
    storage: Arc<dyn KeyValueStore>,
    storage_key: String,
}

impl<T> PersistentSet<T>
where
    T: Keyed + Clone + Serialize + DeserializeOwned,
{
    /// Open the set stored under `storage_key`.
    ///
    /// Never fails: a missing key, an unreadable store or a corrupt payload all
    /// yield an empty set. Payloads longer than `capacity` are truncated and
    /// duplicate keys dropped.
    pub fn open(storage: Arc<dyn KeyValueStore>, storage_key: impl Into<String>, capacity: usize) -> Self {
        let storage_key = storage_key.into();
        let items = Self::load(storage.as_ref(), &storage_key, capacity);
        Self {
            items,
            capacity,
            storage,
            storage_key,
        }
    }

    fn load(storage: &dyn KeyValueStore, key: &str, capacity: usize) -> Vec<T> {
        let contents = match storage.get(key) {
            Ok(Some(contents)) => contents,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key, error = %e, "Failed to read stored set, starting empty");
                return Vec::new();
            }
        };

        let parsed: Vec<T> = match serde_json::from_str(&contents) {
            Ok(items) => items,
            Err(e) => {
                warn!(key, error = %e, "Stored set is corrupt, starting empty");
                return Vec::new();
            }
        };

        let mut items: Vec<T> = Vec::with_capacity(parsed.len().min(capacity));
        for item in parsed {
            if items.len() >= capacity {
                warn!(key, capacity, "Stored set exceeds capacity, truncating");
                break;
            }
            if !items.iter().any(|i| i.key() == item.key()) {
                items.push(item);
            }
        }
        debug!(key, count = items.len(), "Loaded stored set");
        items
    }

    /// Insert `item` and persist.
    ///
    /// A full set rejects every insert, including one for a key it already
    /// holds.
    pub fn insert(&mut self, item: T) -> Result<Inserted, SyncError> {
        if self.is_full() {
            return Err(SyncError::CapacityExceeded { max: self.capacity });
        }
        if self.contains(item.key()) {
            return Ok(Inserted::AlreadyPresent);
        }

        self.items.push(item);
        if let Err(e) = self.persist() {
            self.items.pop();
            return Err(e);
        }
        Ok(Inserted::Added)
    }

    /// Remove the item with `key` and persist. `Ok(None)` when absent.
    pub fn remove(&mut self, key: &str) -> Result<Option<T>, SyncError> {
        let Some(index) = self.items.iter().position(|i| i.key() == key) else {
            return Ok(None);
        };

        let removed = self.items.remove(index);
        if let Err(e) = self.persist() {
            self.items.insert(index, removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    /// Empty the set and delete its storage key.
    pub fn clear(&mut self) -> Result<(), SyncError> {
        self.storage
            .delete(&self.storage_key)
            .map_err(|source| self.persistence_error(source))?;
        self.items.clear();
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.iter().any(|i| i.key() == key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.iter().find(|i| i.key() == key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items in insertion order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.key())
    }

    fn persist(&self) -> Result<(), SyncError> {
        let contents = serde_json::to_string(&self.items).map_err(|e| {
            self.persistence_error(StorageError::Unavailable(format!("serialization failed: {}", e)))
        })?;
        self.storage
            .set(&self.storage_key, &contents)
            .map_err(|source| self.persistence_error(source))
    }

    fn persistence_error(&self, source: StorageError) -> SyncError {
        SyncError::Persistence {
            key: self.storage_key.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: String,
        value: u32,
    }

    impl Keyed for Item {
        fn key(&self) -> &str {
            &self.id
        }
    }

    fn item(id: &str, value: u32) -> Item {
        Item {
            id: id.to_string(),
            value,
        }
    }

    /// Memory store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("quota exceeded".to_string()));
            }
            self.inner.set(key, value)
        }

        fn delete(&self, key: &str) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("quota exceeded".to_string()));
            }
            self.inner.delete(key)
        }
    }

    #[test]
    fn test_round_trip_populated() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut set = PersistentSet::open(Arc::clone(&store), "items", 3);
        set.insert(item("a", 1)).unwrap();
        set.insert(item("b", 2)).unwrap();

        let reopened: PersistentSet<Item> = PersistentSet::open(store, "items", 3);
        assert_eq!(reopened.items(), &[item("a", 1), item("b", 2)]);
    }

    #[test]
    fn test_round_trip_empty() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut set = PersistentSet::open(Arc::clone(&store), "items", 3);
        set.insert(item("a", 1)).unwrap();
        set.remove("a").unwrap();

        let reopened: PersistentSet<Item> = PersistentSet::open(store, "items", 3);
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_corrupt_payload_loads_empty() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set("items", "{not json").unwrap();
        let set: PersistentSet<Item> = PersistentSet::open(store, "items", 3);
        assert!(set.is_empty());
    }

    #[test]
    fn test_oversized_payload_truncated_and_deduplicated() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let stored = vec![item("a", 1), item("a", 9), item("b", 2), item("c", 3), item("d", 4)];
        store.set("items", &serde_json::to_string(&stored).unwrap()).unwrap();

        let set: PersistentSet<Item> = PersistentSet::open(store, "items", 3);
        let keys: Vec<_> = set.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insert_idempotent() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut set = PersistentSet::open(store, "items", 3);
        assert_eq!(set.insert(item("a", 1)).unwrap(), Inserted::Added);
        assert_eq!(set.insert(item("a", 2)).unwrap(), Inserted::AlreadyPresent);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").unwrap().value, 1);
    }

    #[test]
    fn test_capacity_rejected_without_change() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut set = PersistentSet::open(store, "items", 2);
        set.insert(item("a", 1)).unwrap();
        set.insert(item("b", 2)).unwrap();

        let err = set.insert(item("c", 3)).unwrap_err();
        assert!(matches!(err, SyncError::CapacityExceeded { max: 2 }));
        assert_eq!(set.len(), 2);
        assert!(!set.contains("c"));
        // Capacity is checked before membership
        let err = set.insert(item("a", 1)).unwrap_err();
        assert!(matches!(err, SyncError::CapacityExceeded { max: 2 }));
        assert_eq!(set.get("a").unwrap().value, 1);
    }

    #[test]
    fn test_remove_absent_is_none() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut set: PersistentSet<Item> = PersistentSet::open(store, "items", 2);
        assert!(set.remove("missing").unwrap().is_none());
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let flaky = Arc::new(FlakyStore::default());
        let store: Arc<dyn KeyValueStore> = flaky.clone();
        let mut set = PersistentSet::open(store, "items", 3);
        set.insert(item("a", 1)).unwrap();
        set.insert(item("b", 2)).unwrap();

        flaky.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(set.insert(item("c", 3)), Err(SyncError::Persistence { .. })));
        assert!(matches!(set.remove("a"), Err(SyncError::Persistence { .. })));
        assert!(matches!(set.clear(), Err(SyncError::Persistence { .. })));
        assert_eq!(set.items(), &[item("a", 1), item("b", 2)]);
    }

    #[test]
    fn test_clear_deletes_key() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut set = PersistentSet::open(Arc::clone(&store), "items", 3);
        set.insert(item("a", 1)).unwrap();
        set.clear().unwrap();
        assert!(set.is_empty());
        assert_eq!(store.get("items").unwrap(), None);
    }
}

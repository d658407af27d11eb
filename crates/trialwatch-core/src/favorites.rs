//! The user's pinned studies.
//!
//! `FavoritesStore` is a [`PersistentSet`] of [`Record`] snapshots capped at
//! [`MAX_FAVORITES`]. Mutations report whether anything changed; the owner
//! publishes the new snapshot once its own locks are released. Failed
//! mutations leave the set unchanged.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::KeyValueStore;
use crate::error::SyncError;
use crate::models::Record;
use crate::persistent_set::{Inserted, PersistentSet};

/// Hard cap on the number of favorites.
pub const MAX_FAVORITES: usize = 10;

/// Storage key for the favorites snapshot.
pub const FAVORITES_KEY: &str = "favorite_trials";

pub struct FavoritesStore {
    set: PersistentSet<Record>,
}

impl FavoritesStore {
    /// Load favorites from `storage`. Never fails; see [`PersistentSet::open`].
    pub fn open(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            set: PersistentSet::open(storage, FAVORITES_KEY, MAX_FAVORITES),
        }
    }

    /// Pin `record`. Returns false when the id was already pinned.
    pub fn add(&mut self, record: &Record) -> Result<bool, SyncError> {
        match self.set.insert(record.with_favorite(true))? {
            Inserted::Added => {
                info!(id = %record.id, count = self.set.len(), "Added favorite");
                Ok(true)
            }
            Inserted::AlreadyPresent => Ok(false),
        }
    }

    /// Unpin `id`. Absent ids are logged and give false.
    pub fn remove(&mut self, id: &str) -> Result<bool, SyncError> {
        match self.set.remove(id)? {
            Some(_) => {
                info!(id, count = self.set.len(), "Removed favorite");
                Ok(true)
            }
            None => {
                warn!(id, "Trial not found in favorites");
                Ok(false)
            }
        }
    }

    /// Remove everything. Storage failures are returned, never swallowed.
    pub fn clear(&mut self) -> Result<(), SyncError> {
        self.set.clear()?;
        info!("Cleared favorites");
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.set.contains(id)
    }

    pub fn count(&self) -> usize {
        self.set.len()
    }

    pub fn is_max_reached(&self) -> bool {
        self.count() >= MAX_FAVORITES
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.set.get(id).map(|r| r.with_favorite(true))
    }

    /// Stored copies, always flagged whatever an older payload says.
    pub fn snapshot(&self) -> Vec<Record> {
        self.set.items().iter().map(|r| r.with_favorite(true)).collect()
    }

    pub fn ids(&self) -> HashSet<String> {
        self.set.keys().map(str::to_string).collect()
    }
}

//! The sliding window of recently fetched records.
//!
//! Oldest first, at most [`MAX_WINDOW`] entries. Favorite flags on window
//! entries are derived from the favorites store and rewritten by [`TrialWindow::resync`].
//! Every mutation writes a best-effort snapshot so a restart can show the
//! last-seen view without the network. Publishing is left to the owner.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cache::{CachedData, KeyValueStore};
use crate::models::Record;

/// Maximum number of records held by the window.
pub const MAX_WINDOW: usize = 10;

/// Storage key for the window snapshot.
pub const WINDOW_KEY: &str = "trial_window";

pub struct TrialWindow {
    records: Vec<Record>,
    storage: Arc<dyn KeyValueStore>,
    restored_at: Option<DateTime<Utc>>,
}

impl TrialWindow {
    /// Restore the last persisted window, re-deriving favorite flags from
    /// `favorite_ids`. Missing or unreadable snapshots give an empty window.
    pub fn open(storage: Arc<dyn KeyValueStore>, favorite_ids: &HashSet<String>) -> Self {
        let (mut records, restored_at) = match Self::load_snapshot(storage.as_ref()) {
            Some(cached) => (cached.data, Some(cached.cached_at)),
            None => (Vec::new(), None),
        };
        records.truncate(MAX_WINDOW);
        for record in &mut records {
            record.is_favorite = favorite_ids.contains(&record.id);
        }

        Self {
            records,
            storage,
            restored_at,
        }
    }

    fn load_snapshot(storage: &dyn KeyValueStore) -> Option<CachedData<Vec<Record>>> {
        let contents = match storage.get(WINDOW_KEY) {
            Ok(contents) => contents?,
            Err(e) => {
                warn!(error = %e, "Failed to read window snapshot");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!(error = %e, "Window snapshot is corrupt, ignoring");
                None
            }
        }
    }

    /// Replace the whole window with the first [`MAX_WINDOW`] of `records`.
    pub fn replace_all(&mut self, records: Vec<Record>, favorite_ids: &HashSet<String>) {
        self.records = records
            .into_iter()
            .take(MAX_WINDOW)
            .map(|mut r| {
                r.is_favorite = favorite_ids.contains(&r.id);
                r
            })
            .collect();
        debug!(count = self.records.len(), "Window replaced");
        self.persist();
    }

    /// Append `record` (flagged per `is_favorite`), evicting the oldest entry
    /// first when the window is full. Returns the evicted record.
    pub fn append_one_with_eviction(&mut self, mut record: Record, is_favorite: bool) -> Option<Record> {
        let evicted = if self.records.len() >= MAX_WINDOW {
            Some(self.records.remove(0))
        } else {
            None
        };
        record.is_favorite = is_favorite;
        debug!(id = %record.id, evicted = ?evicted.as_ref().map(|r| &r.id), "Window append");
        self.records.push(record);
        self.persist();
        evicted
    }

    /// Rewrite every favorite flag from `favorite_ids`. Returns whether any
    /// flag changed; nothing is written otherwise.
    pub fn resync(&mut self, favorite_ids: &HashSet<String>) -> bool {
        let mut changed = false;
        for record in &mut self.records {
            let flag = favorite_ids.contains(&record.id);
            if record.is_favorite != flag {
                record.is_favorite = flag;
                changed = true;
            }
        }
        if changed {
            self.persist();
        }
        changed
    }

    /// Empty the window.
    pub fn reset(&mut self) {
        self.records.clear();
        self.persist();
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// When the snapshot restored at startup was written, if any.
    pub fn restored_at(&self) -> Option<DateTime<Utc>> {
        self.restored_at
    }

    /// Best-effort: a failed write is logged and otherwise ignored.
    fn persist(&self) {
        let cached = CachedData::new(&self.records);
        let result = serde_json::to_string(&cached)
            .map_err(|e| e.to_string())
            .and_then(|json| self.storage.set(WINDOW_KEY, &json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist window snapshot");
        }
    }
}

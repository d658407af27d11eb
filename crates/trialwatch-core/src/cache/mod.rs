//! Local persistence for offline access.
//!
//! This module provides the `KeyValueStore` port used by the favorites set
//! and the record window, a file-backed implementation that keeps one JSON
//! file per key in the cache directory, and `CachedData` for timestamped
//! snapshots.
//!
//! Keys in use:
//! - `favorite_trials`: the favorites set
//! - `trial_window`: the last-seen record window

pub mod snapshot;
pub mod store;

pub use snapshot::CachedData;
pub use store::{FileStore, KeyValueStore, MemoryStore, StorageError};

//! Core synchronization logic for Trialwatch.
//!
//! Keeps a bounded window of recently fetched clinical-trial records fresh
//! from a remote catalog, and a bounded, persisted set of favorites whose
//! membership is reflected on every window entry. Front ends drive it through
//! [`TrialService`] and render the feeds it publishes.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod favorites;
pub mod models;
pub mod observable;
pub mod persistent_set;
pub mod poller;
pub mod sampling;
pub mod service;
pub mod window;

pub use api::{ApiClient, ApiError, CatalogGateway};
pub use cache::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use config::{Config, EvictionPolicy, PoolScope};
pub use error::SyncError;
pub use favorites::{FavoritesStore, MAX_FAVORITES};
pub use models::{Record, Study};
pub use observable::{DeliveryLock, Observable, Subscription};
pub use poller::{PollEvent, PollerState};
pub use service::TrialService;
pub use window::{TrialWindow, MAX_WINDOW};

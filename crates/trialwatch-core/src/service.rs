//! `TrialService`: the commands a front end issues and the feeds it renders.
//!
//! The service owns the favorites store, the record window, the poller and
//! the sampling pool. Shared state sits behind `parking_lot` mutexes that are
//! never held across an `.await`; when more than one is needed they are
//! taken in the order poller, favorites, window.
//!
//! Every mutation runs under the publish lock, a reentrant lock shared with
//! the service's feeds. State locks are released before anything is
//! published, so observers may read back from the service. A favorites
//! change re-flags the window in the same step, so the two cannot drift
//! apart.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{with_retry, CatalogGateway};
use crate::cache::{CachedData, KeyValueStore};
use crate::config::{Config, EvictionPolicy, PoolScope};
use crate::error::SyncError;
use crate::favorites::{FavoritesStore, MAX_FAVORITES};
use crate::models::{map_studies, map_study, Record};
use crate::observable::{DeliveryLock, Observable};
use crate::poller::{PollEvent, PollSession, Poller, PollerState};
use crate::sampling::SamplingPool;
use crate::window::TrialWindow;

/// Buffered poll events per receiver before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 64;

struct Inner {
    config: Config,
    gateway: Arc<dyn CatalogGateway>,
    /// Taken before any state lock.
    publish_lock: DeliveryLock,
    poller: Mutex<Poller>,
    favorites: Mutex<FavoritesStore>,
    window: Mutex<TrialWindow>,
    pool: Mutex<Option<SamplingPool>>,
    rng: Mutex<StdRng>,
    in_flight: Mutex<usize>,
    loading: Observable<bool>,
    window_changes: Observable<Vec<Record>>,
    favorite_changes: Observable<Vec<Record>>,
    poller_changes: Observable<PollerState>,
    events: broadcast::Sender<PollEvent>,
}

/// Feeds touched by one mutation.
#[derive(Default)]
struct Changed {
    loading: bool,
    poller: bool,
    favorites: bool,
    window: bool,
}

impl Inner {
    /// Run `mutate` under the publish lock, then publish what it changed.
    ///
    /// `mutate` takes whatever state locks it needs and releases them on
    /// return. Published values are read fresh, so a nested mutation made by
    /// an observer is never overwritten by an older snapshot.
    fn commit<R>(&self, mutate: impl FnOnce(&Inner, &mut Changed) -> R) -> R {
        let _order = self.publish_lock.lock();
        let mut changed = Changed::default();
        let result = mutate(self, &mut changed);
        self.deliver(changed);
        result
    }

    fn deliver(&self, changed: Changed) {
        if changed.loading {
            let loading = *self.in_flight.lock() > 0;
            self.loading.publish(loading);
        }
        if changed.poller {
            let state = self.poller.lock().state();
            self.poller_changes.publish(state);
        }
        if changed.favorites {
            let snapshot = self.favorites.lock().snapshot();
            self.favorite_changes.publish(snapshot);
        }
        if changed.window {
            let snapshot = self.window.lock().records().to_vec();
            self.window_changes.publish(snapshot);
        }
    }

    /// Re-flag the window after `favorites` changed. The caller holds the
    /// favorites lock; the window lock must be free.
    fn favorites_changed(&self, favorites: &FavoritesStore, changed: &mut Changed) {
        changed.favorites = true;
        if self.window.lock().resync(&favorites.ids()) {
            changed.window = true;
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Ends a running poll loop, which only holds a weak reference
        self.poller.get_mut().stop();
    }
}

/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct TrialService {
    inner: Arc<Inner>,
}

impl TrialService {
    /// Open persisted favorites and the last window snapshot from `storage`.
    /// Nothing is fetched until a command asks for it.
    pub fn new(config: Config, gateway: Arc<dyn CatalogGateway>, storage: Arc<dyn KeyValueStore>) -> Self {
        let favorites = FavoritesStore::open(Arc::clone(&storage));
        let window = TrialWindow::open(storage, &favorites.ids());
        info!(
            favorites = favorites.count(),
            window = window.len(),
            restored_at = ?window.restored_at(),
            "Trial service opened"
        );

        let publish_lock: DeliveryLock = Arc::new(ReentrantMutex::new(()));
        let window_changes = Observable::with_delivery_lock(window.records().to_vec(), Arc::clone(&publish_lock));
        let favorite_changes = Observable::with_delivery_lock(favorites.snapshot(), Arc::clone(&publish_lock));
        let loading = Observable::with_delivery_lock(false, Arc::clone(&publish_lock));
        let poller_changes = Observable::with_delivery_lock(PollerState::Idle, Arc::clone(&publish_lock));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                config,
                gateway,
                publish_lock,
                poller: Mutex::new(Poller::new()),
                favorites: Mutex::new(favorites),
                window: Mutex::new(window),
                pool: Mutex::new(None),
                rng: Mutex::new(StdRng::from_entropy()),
                in_flight: Mutex::new(0),
                loading,
                window_changes,
                favorite_changes,
                poller_changes,
                events,
            }),
        }
    }

    /// Make id sampling reproducible.
    pub fn reseed(&self, seed: u64) {
        *self.inner.rng.lock() = StdRng::seed_from_u64(seed);
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    // ===== Feeds =====
    //
    // Observers run after the service's state locks are released and may
    // call any read below. Mutating commands called from an observer must
    // stay on the observer's thread.

    /// Full window snapshots, oldest first.
    pub fn window_changes(&self) -> &Observable<Vec<Record>> {
        &self.inner.window_changes
    }

    /// Full favorites snapshots, in insertion order.
    pub fn favorite_changes(&self) -> &Observable<Vec<Record>> {
        &self.inner.favorite_changes
    }

    /// True while a user-initiated load or refresh is in flight.
    pub fn loading(&self) -> &Observable<bool> {
        &self.inner.loading
    }

    pub fn poller_state(&self) -> &Observable<PollerState> {
        &self.inner.poller_changes
    }

    /// Outcome of every poll tick, including failures.
    pub fn poll_events(&self) -> broadcast::Receiver<PollEvent> {
        self.inner.events.subscribe()
    }

    // ===== Reads =====

    pub fn window_snapshot(&self) -> Vec<Record> {
        self.inner.window.lock().records().to_vec()
    }

    pub fn favorites_snapshot(&self) -> Vec<Record> {
        self.inner.favorites.lock().snapshot()
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.inner.favorites.lock().contains(id)
    }

    pub fn favorites_count(&self) -> usize {
        self.inner.favorites.lock().count()
    }

    pub fn is_max_favorites_reached(&self) -> bool {
        self.inner.favorites.lock().is_max_reached()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.poller.lock().state() != PollerState::Idle
    }

    /// Age of the window snapshot restored at startup, if one was found.
    pub fn restored_age(&self) -> Option<String> {
        let cached_at = self.inner.window.lock().restored_at()?;
        Some(CachedData { data: (), cached_at }.age_display())
    }

    /// A record already on hand: the window copy first, then the favorites copy.
    pub fn find_local(&self, id: &str) -> Option<Record> {
        let favorites = self.inner.favorites.lock();
        let window = self.inner.window.lock();
        window.get(id).cloned().or_else(|| favorites.get(id))
    }

    // ===== Commands =====

    /// Replace the window with the first page of the catalog.
    ///
    /// On failure the window keeps its previous contents. Concurrent loads
    /// each replace the window wholesale; the last one to finish wins.
    pub async fn load_initial(&self) -> Result<usize, SyncError> {
        let _loading = LoadingGuard::begin(&self.inner);
        let gateway = self.inner.gateway.as_ref();
        let page_size = self.inner.config.page_size;
        let studies = with_retry("fetch_page", self.inner.config.retry_attempts, None, move || {
            gateway.fetch_page(page_size)
        })
        .await?;

        let records = map_studies(&studies);
        if records.len() < studies.len() {
            warn!(skipped = studies.len() - records.len(), "Skipped studies without an id");
        }

        let count = self.inner.commit(|inner, changed| {
            let favorites = inner.favorites.lock();
            let mut window = inner.window.lock();
            window.replace_all(records, &favorites.ids());
            changed.window = true;
            window.len()
        });
        info!(count, "Initial load complete");
        Ok(count)
    }

    /// Fetch one random study now and append it, outside the poll timer.
    pub async fn refresh_now(&self) -> Result<Record, SyncError> {
        let _loading = LoadingGuard::begin(&self.inner);
        self.ensure_pool().await?;
        let record = self.fetch_sampled().await?;
        self.apply_append(record.clone(), None);
        let is_favorite = self.is_favorite(&record.id);
        Ok(record.with_favorite(is_favorite))
    }

    /// Begin polling: prime the id pool, append one record right away, then
    /// keep appending on every interval until [`Self::stop_polling`].
    ///
    /// No-op while already priming or running. If the pool cannot be fetched
    /// the poller returns to idle and the error is returned. Errors from the
    /// first fetch are reported like any tick error and do not fail the call.
    pub async fn start_polling(&self) -> Result<(), SyncError> {
        let begun = self.inner.commit(|inner, changed| {
            let session = inner.poller.lock().begin();
            changed.poller = session.is_some();
            session
        });
        let Some(session) = begun else {
            debug!("Poller already active");
            return Ok(());
        };
        let priming = PrimingGuard::new(&self.inner, &session);

        let primed = tokio::select! {
            biased;
            _ = session.token().cancelled() => Err(SyncError::Cancelled),
            result = self.ensure_pool() => result,
        };
        if let Err(e) = primed {
            warn!(error = %e, "Failed to prime poller");
            return Err(e);
        }

        self.run_tick(&session).await;

        let service = Arc::downgrade(&self.inner);
        let period = self.inner.config.poll_interval();
        let running = self.inner.commit(|inner, changed| {
            let mut poller = inner.poller.lock();
            if !poller.is_current(&session) {
                return false;
            }
            let handle = tokio::spawn(poll_loop(service, session.clone(), period));
            changed.poller = poller.mark_running(&session, handle);
            changed.poller
        });
        if !running {
            return Err(SyncError::Cancelled);
        }
        priming.disarm();
        Ok(())
    }

    /// Stop polling. Safe to call at any time, any number of times. Results
    /// of a fetch still in flight are discarded.
    pub fn stop_polling(&self) {
        self.inner.commit(|inner, changed| {
            changed.poller = inner.poller.lock().stop();
            if changed.poller && inner.config.pool_scope == PoolScope::PerSession {
                *inner.pool.lock() = None;
                debug!("Sampling pool discarded");
            }
        });
    }

    /// Flip the favorite state of `id`. Returns the new state.
    ///
    /// A study shown nowhere locally is fetched first. Either the store and
    /// the window flag both change, or neither does.
    pub async fn toggle_favorite(&self, id: &str) -> Result<bool, SyncError> {
        let toggled = self.inner.commit(|inner, changed| -> Result<Option<bool>, SyncError> {
            let mut favorites = inner.favorites.lock();
            if favorites.contains(id) {
                favorites.remove(id)?;
                inner.favorites_changed(&favorites, changed);
                return Ok(Some(false));
            }
            if favorites.is_max_reached() {
                return Err(SyncError::CapacityExceeded { max: MAX_FAVORITES });
            }
            let local = inner.window.lock().get(id).cloned();
            match local {
                Some(record) => {
                    favorites.add(&record)?;
                    inner.favorites_changed(&favorites, changed);
                    Ok(Some(true))
                }
                None => Ok(None),
            }
        })?;
        if let Some(state) = toggled {
            return Ok(state);
        }

        let record = self.fetch_record(id).await?;
        self.add_favorite(&record)?;
        Ok(true)
    }

    /// Pin `record` directly.
    pub fn add_favorite(&self, record: &Record) -> Result<(), SyncError> {
        self.inner.commit(|inner, changed| {
            let mut favorites = inner.favorites.lock();
            if favorites.add(record)? {
                inner.favorites_changed(&favorites, changed);
            }
            Ok(())
        })
    }

    pub fn remove_favorite(&self, id: &str) -> Result<(), SyncError> {
        self.inner.commit(|inner, changed| {
            let mut favorites = inner.favorites.lock();
            if favorites.remove(id)? {
                inner.favorites_changed(&favorites, changed);
            }
            Ok(())
        })
    }

    pub fn clear_favorites(&self) -> Result<(), SyncError> {
        self.inner.commit(|inner, changed| {
            let mut favorites = inner.favorites.lock();
            favorites.clear()?;
            inner.favorites_changed(&favorites, changed);
            Ok(())
        })
    }

    /// Empty the window. Favorites are untouched.
    pub fn reset_window(&self) {
        self.inner.commit(|inner, changed| {
            inner.window.lock().reset();
            changed.window = true;
        });
    }

    /// Fetch a single study for a detail view. The favorite flag reflects
    /// the store; the window is left alone.
    pub async fn get_by_id(&self, id: &str) -> Result<Record, SyncError> {
        let record = self.fetch_record(id).await?;
        let is_favorite = self.is_favorite(&record.id);
        Ok(record.with_favorite(is_favorite))
    }

    // ===== Internals =====

    async fn fetch_record(&self, id: &str) -> Result<Record, SyncError> {
        let gateway = self.inner.gateway.as_ref();
        let study = with_retry("fetch_by_id", self.inner.config.retry_attempts, Some(id), move || {
            gateway.fetch_by_id(id)
        })
        .await?;
        map_study(&study).ok_or_else(|| SyncError::InvalidResponse(format!("study {} has no id", id)))
    }

    /// Fetch the id pool unless one is already loaded.
    async fn ensure_pool(&self) -> Result<(), SyncError> {
        if self.inner.pool.lock().as_ref().is_some_and(|p| !p.is_empty()) {
            return Ok(());
        }
        let gateway = self.inner.gateway.as_ref();
        let max_ids = self.inner.config.id_pool_size;
        let ids = with_retry("fetch_id_pool", self.inner.config.retry_attempts, None, move || {
            gateway.fetch_id_pool(max_ids)
        })
        .await?;

        let pool = SamplingPool::new(ids);
        if pool.is_empty() {
            return Err(SyncError::InvalidResponse("catalog returned no study ids".to_string()));
        }
        info!(size = pool.len(), "Sampling pool loaded");
        *self.inner.pool.lock() = Some(pool);
        Ok(())
    }

    async fn fetch_sampled(&self) -> Result<Record, SyncError> {
        let id = {
            let mut rng = self.inner.rng.lock();
            let mut pool = self.inner.pool.lock();
            pool.as_mut().and_then(|pool| pool.sample(&mut *rng))
        };
        let id = id.ok_or_else(|| SyncError::InvalidResponse("no sampling pool loaded".to_string()))?;
        debug!(%id, "Sampled study");
        self.fetch_record(&id).await
    }

    /// Append `record`, discarding it if `session` is given and no longer
    /// current. Returns what was appended and evicted.
    fn apply_append(&self, record: Record, session: Option<&PollSession>) -> Option<PollEvent> {
        self.inner.commit(|inner, changed| {
            let poller = inner.poller.lock();
            if let Some(session) = session {
                if !poller.is_current(session) {
                    debug!(id = %record.id, "Discarding result from stopped poller");
                    return None;
                }
            }

            let mut favorites = inner.favorites.lock();
            let id = record.id.clone();
            let is_favorite = favorites.contains(&id);
            let evicted = inner.window.lock().append_one_with_eviction(record, is_favorite);
            changed.window = true;

            if let Some(evicted) = &evicted {
                if inner.config.eviction_policy == EvictionPolicy::RemoveFavorite
                    && favorites.contains(&evicted.id)
                    && inner.window.lock().get(&evicted.id).is_none()
                {
                    match favorites.remove(&evicted.id) {
                        Ok(_) => inner.favorites_changed(&favorites, changed),
                        Err(e) => warn!(id = %evicted.id, error = %e, "Failed to unpin evicted favorite"),
                    }
                }
            }

            Some(PollEvent::Appended {
                id,
                evicted: evicted.map(|r| r.id),
            })
        })
    }

    async fn run_tick(&self, session: &PollSession) {
        let outcome = tokio::select! {
            biased;
            _ = session.token().cancelled() => return,
            result = self.fetch_sampled() => result,
        };
        let event = match outcome {
            Ok(record) => match self.apply_append(record, Some(session)) {
                Some(event) => event,
                None => return,
            },
            Err(e) => {
                warn!(error = %e, "Poll tick failed");
                PollEvent::Failed {
                    error: e.to_string(),
                    transient: e.is_transient(),
                }
            }
        };
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }
}

/// Timer loop for one session. Holds the service weakly so that dropping the
/// last `TrialService` ends polling.
async fn poll_loop(service: Weak<Inner>, session: PollSession, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = session.token().cancelled() => {
                debug!(generation = session.generation(), "Poll loop exiting");
                break;
            }
            _ = ticker.tick() => {
                let Some(inner) = service.upgrade() else {
                    debug!(generation = session.generation(), "Service dropped, poll loop exiting");
                    break;
                };
                TrialService { inner }.run_tick(&session).await;
            }
        }
    }
}

/// Drives the loading flag: true while at least one guard is alive.
struct LoadingGuard<'a> {
    inner: &'a Inner,
}

impl<'a> LoadingGuard<'a> {
    fn begin(inner: &'a Inner) -> Self {
        inner.commit(|inner, changed| {
            let mut in_flight = inner.in_flight.lock();
            *in_flight += 1;
            changed.loading = *in_flight == 1;
        });
        Self { inner }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.inner.commit(|inner, changed| {
            let mut in_flight = inner.in_flight.lock();
            *in_flight = in_flight.saturating_sub(1);
            changed.loading = *in_flight == 0;
        });
    }
}

/// Returns the poller to idle if `start_polling` exits before running,
/// including when its future is dropped.
struct PrimingGuard<'a> {
    inner: &'a Inner,
    session: &'a PollSession,
    armed: bool,
}

impl<'a> PrimingGuard<'a> {
    fn new(inner: &'a Inner, session: &'a PollSession) -> Self {
        Self {
            inner,
            session,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PrimingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let session = self.session;
            self.inner.commit(|inner, changed| {
                changed.poller = inner.poller.lock().fail_priming(session);
            });
        }
    }
}

//! Per-(ticker, category) result cache with TTL, single-flight fetches and an LRU bound on the
//! number of resident tickers.

use crate::{
    category::{Category, TickerKey},
    error::CategoryError,
    model::CanonicalRecord,
};
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use fnv::FnvHashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::debug;

/// Default maximum number of resident tickers.
pub const DEFAULT_MAX_TICKERS: usize = 64;

/// Result of one category fetch, shared between every waiter of the same flight.
pub type FetchResult = Result<Arc<[CanonicalRecord]>, CategoryError>;

type InFlight = Shared<BoxFuture<'static, FetchResult>>;

#[derive(
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    Display,
    Constructor,
    Deserialize,
    Serialize,
)]
#[display("{ticker}/{category}")]
pub struct CacheKey {
    pub ticker: TickerKey,
    pub category: Category,
}

/// Load state of one [`CacheKey`].
///
/// `Idle -> Loading -> {Loaded | Failed}`, re-entering `Loading` on forced refresh or TTL expiry.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[display("idle")]
    Idle,
    #[display("loading")]
    Loading,
    #[display("loaded")]
    Loaded,
    #[display("failed")]
    Failed,
}

/// Snapshot of a cached category payload.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub payload: Arc<[CanonicalRecord]>,
    pub fetched_at: Instant,
    pub fetched_at_utc: DateTime<Utc>,
    pub ttl: Duration,
    /// Error of the most recent refresh, if it failed. The payload is then stale.
    pub last_error: Option<CategoryError>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

#[derive(Clone, Debug)]
struct Stored {
    payload: Arc<[CanonicalRecord]>,
    fetched_at: Instant,
    fetched_at_utc: DateTime<Utc>,
    ttl: Duration,
}

#[derive(Clone)]
struct Flight {
    id: u64,
    future: InFlight,
}

#[derive(Default)]
struct Slot {
    stored: Option<Stored>,
    last_error: Option<CategoryError>,
    in_flight: Option<Flight>,
}

impl Slot {
    fn entry(&self) -> Option<CacheEntry> {
        self.stored.as_ref().map(|stored| CacheEntry {
            payload: Arc::clone(&stored.payload),
            fetched_at: stored.fetched_at,
            fetched_at_utc: stored.fetched_at_utc,
            ttl: stored.ttl,
            last_error: self.last_error.clone(),
        })
    }

    /// Drop the stored payload & error, keeping any flight. True if anything was dropped.
    fn clear(&mut self) -> bool {
        let stored = self.stored.take().is_some();
        let errored = self.last_error.take().is_some();
        stored || errored
    }

    fn state(&self) -> LoadState {
        if self.in_flight.is_some() {
            LoadState::Loading
        } else if self.last_error.is_some() {
            LoadState::Failed
        } else if self.stored.is_some() {
            LoadState::Loaded
        } else {
            LoadState::Idle
        }
    }
}

#[derive(Default)]
struct TickerSlots {
    last_access: u64,
    categories: FnvHashMap<Category, Slot>,
}

impl TickerSlots {
    fn has_flight(&self) -> bool {
        self.categories.values().any(|slot| slot.in_flight.is_some())
    }
}

#[derive(Default)]
struct Inner {
    tickers: FnvHashMap<TickerKey, TickerSlots>,
    clock: u64,
    next_flight: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn slot(&mut self, key: &CacheKey) -> Option<&mut Slot> {
        let now = self.tick();
        let ticker = self.tickers.get_mut(&key.ticker)?;
        ticker.last_access = now;
        ticker.categories.get_mut(&key.category)
    }

    fn slot_or_insert(&mut self, key: &CacheKey, max_tickers: usize) -> &mut Slot {
        if !self.tickers.contains_key(&key.ticker) {
            self.evict(max_tickers.saturating_sub(1));
        }

        let now = self.tick();
        let ticker = self.tickers.entry(key.ticker.clone()).or_default();
        ticker.last_access = now;
        ticker.categories.entry(key.category).or_default()
    }

    /// Evict least-recently-accessed tickers without a fetch in flight until at most `keep`
    /// remain.
    fn evict(&mut self, keep: usize) {
        while self.tickers.len() > keep {
            let Some(victim) = self
                .tickers
                .iter()
                .filter(|(_, slots)| !slots.has_flight())
                .min_by_key(|(_, slots)| slots.last_access)
                .map(|(ticker, _)| ticker.clone())
            else {
                break;
            };

            debug!(ticker = %victim, resident = self.tickers.len(), "evicting ticker from cache");
            self.tickers.remove(&victim);
        }
    }

    /// Record the result of flight `id`. A result for a flight no longer registered for the key
    /// is dropped.
    fn complete(&mut self, key: &CacheKey, id: u64, ttl: Duration, result: &FetchResult) {
        let Some(slot) = self
            .tickers
            .get_mut(&key.ticker)
            .and_then(|ticker| ticker.categories.get_mut(&key.category))
        else {
            return;
        };

        if slot.in_flight.as_ref().map(|flight| flight.id) != Some(id) {
            return;
        }
        slot.in_flight = None;

        match result {
            Ok(payload) => {
                slot.stored = Some(Stored {
                    payload: Arc::clone(payload),
                    fetched_at: Instant::now(),
                    fetched_at_utc: Utc::now(),
                    ttl,
                });
                slot.last_error = None;
            }
            Err(error) => {
                slot.last_error = Some(error.clone());
            }
        }
    }
}

/// In-memory, internally synchronised cache shared by every
/// [`Aggregator`](crate::aggregator::Aggregator) request.
///
/// The lock is only held for non-suspending map operations. Fetches run on spawned tasks, so
/// a caller abandoning [`CacheStore::get_or_fetch`] never cancels the upstream work; the
/// completed result still lands in the cache.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Mutex<Inner>>,
    max_tickers: usize,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("max_tickers", &self.max_tickers)
            .field("resident", &self.len())
            .finish()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TICKERS)
    }
}

impl CacheStore {
    pub fn new(max_tickers: usize) -> Self {
        Self {
            inner: Arc::default(),
            max_tickers: max_tickers.max(1),
        }
    }

    /// Cached entry for the key, stale or not.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.lock().slot(key).and_then(|slot| slot.entry())
    }

    /// Return the cached payload if fresh, otherwise join the in-flight fetch for the key or
    /// start one with `fetch`.
    ///
    /// At most one fetch is in flight per key; `fetch` is only invoked when this call starts
    /// it. On failure the previous payload is kept and the error returned to every waiter.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &CacheKey,
        fetch: F,
        ttl: Duration,
        force_refresh: bool,
    ) -> FetchResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        let flight = {
            let mut inner = self.inner.lock();
            inner.next_flight += 1;
            let id = inner.next_flight;
            let slot = inner.slot_or_insert(key, self.max_tickers);

            let fresh = slot
                .stored
                .as_ref()
                .filter(|stored| {
                    !force_refresh
                        && slot.last_error.is_none()
                        && Instant::now().saturating_duration_since(stored.fetched_at) < stored.ttl
                })
                .map(|stored| Arc::clone(&stored.payload));

            if let Some(payload) = fresh {
                debug!(%key, "cache hit");
                return Ok(payload);
            }

            match slot.in_flight.as_ref().map(|flight| flight.future.clone()) {
                Some(future) => {
                    debug!(%key, "joining in-flight fetch");
                    future
                }
                None => {
                    debug!(%key, force_refresh, "starting fetch");
                    let future = self.spawn_flight(key.clone(), id, ttl, fetch());
                    slot.in_flight = Some(Flight {
                        id,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        flight.await
    }

    fn spawn_flight<Fut>(&self, key: CacheKey, id: u64, ttl: Duration, fetch: Fut) -> InFlight
    where
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        let task = tokio::spawn({
            let inner = Arc::clone(&self.inner);
            let key = key.clone();
            async move {
                let result = fetch.await;
                inner.lock().complete(&key, id, ttl, &result);
                result
            }
        });

        let inner = Arc::clone(&self.inner);
        async move {
            match task.await {
                Ok(result) => result,
                Err(error) => {
                    let result = Err(CategoryError::Aborted(key.category, error.to_string()));
                    inner.lock().complete(&key, id, ttl, &result);
                    result
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Drop the cached payload & error for one key, forcing the next request to re-fetch.
    ///
    /// A fetch already in flight for the key is kept: later requests join it instead of starting
    /// a second one, and its result repopulates the entry.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.lock();
        let Some(ticker) = inner.tickers.get_mut(&key.ticker) else {
            return false;
        };
        let Some(slot) = ticker.categories.get_mut(&key.category) else {
            return false;
        };

        let removed = slot.clear();
        if slot.in_flight.is_none() {
            ticker.categories.remove(&key.category);
        }
        if ticker.categories.is_empty() {
            inner.tickers.remove(&key.ticker);
        }
        removed
    }

    /// [`CacheStore::invalidate`] every category of a ticker.
    pub fn invalidate_ticker(&self, ticker: &TickerKey) -> bool {
        let mut inner = self.inner.lock();
        let Some(slots) = inner.tickers.get_mut(ticker) else {
            return false;
        };

        let mut removed = false;
        slots.categories.retain(|_, slot| {
            removed |= slot.clear();
            slot.in_flight.is_some()
        });
        if slots.categories.is_empty() {
            inner.tickers.remove(ticker);
        }
        removed
    }

    pub fn state(&self, key: &CacheKey) -> LoadState {
        self.inner
            .lock()
            .tickers
            .get(&key.ticker)
            .and_then(|ticker| ticker.categories.get(&key.category))
            .map_or(LoadState::Idle, Slot::state)
    }

    /// Error of the most recent fetch for the key, if it failed.
    pub fn last_error(&self, key: &CacheKey) -> Option<CategoryError> {
        self.inner
            .lock()
            .tickers
            .get(&key.ticker)
            .and_then(|ticker| ticker.categories.get(&key.category))
            .and_then(|slot| slot.last_error.clone())
    }

    /// Every category of the ticker currently holding a payload, stale or not.
    pub fn resolved(&self, ticker: &TickerKey) -> Vec<(Category, Arc<[CanonicalRecord]>)> {
        let inner = self.inner.lock();
        let Some(slots) = inner.tickers.get(ticker) else {
            return Vec::new();
        };

        let mut resolved = slots
            .categories
            .iter()
            .filter_map(|(category, slot)| {
                slot.stored
                    .as_ref()
                    .map(|stored| (*category, Arc::clone(&stored.payload)))
            })
            .collect::<Vec<_>>();
        resolved.sort_by_key(|(category, _)| *category);
        resolved
    }

    /// Number of resident tickers.
    pub fn len(&self) -> usize {
        self.inner.lock().tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tickers(&self) -> Vec<TickerKey> {
        let mut tickers = self.inner.lock().tickers.keys().cloned().collect::<Vec<_>>();
        tickers.sort();
        tickers
    }

    pub fn max_tickers(&self) -> usize {
        self.max_tickers
    }
}

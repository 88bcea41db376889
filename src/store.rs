use async_trait::async_trait;
use moka::{future::Cache, Expiry};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::error::Result;

/// A live windowed counter as observed by a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    /// Requests observed in the current window. Always >= 1 while the entry
    /// is live; a zero-count entry is never materialized.
    pub count: u64,
    /// Absolute instant at which the entry becomes invalid.
    pub expires_at: Instant,
}

/// Outcome of an `initialize` call.
///
/// Exactly one of any set of concurrent initializers for the same key
/// observes `Created`; the rest observe `AlreadyExists` and must not assume
/// the window was reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    AlreadyExists,
}

/// Shared, time-aware counter store: key -> (count, expiry).
///
/// The store knows nothing about roles or quotas. Each operation is a single
/// atomic primitive with respect to concurrent callers on the same key;
/// operations on different keys are fully independent.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Return the entry for `key` if present and unexpired. A logically
    /// expired entry behaves as absent. Reading never mutates the entry.
    async fn get(&self, key: &str) -> Result<Option<CounterEntry>>;

    /// Atomically create an entry with `count = 1` expiring `window` from
    /// now, unless a live entry already exists for `key`.
    async fn initialize(&self, key: &str, window: Duration) -> Result<InitOutcome>;

    /// Atomically add 1 to a live entry and return the new count, or `None`
    /// when no live entry exists (e.g. it expired since the caller's `get`).
    async fn increment(&self, key: &str) -> Result<Option<u64>>;

    /// Liveness of the backing medium.
    async fn health_check(&self) -> Result<()>;
}

/// One counter cell. The count is advanced lock-free; the window bounds are
/// fixed at creation and only replaced by a fresh cell after expiry.
struct CounterCell {
    count: AtomicU64,
    window: Duration,
    expires_at: Instant,
}

impl CounterCell {
    fn new(window: Duration) -> Self {
        Self {
            count: AtomicU64::new(1),
            window,
            expires_at: Instant::now() + window,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Expires each cell at the end of its own window.
struct CounterExpiry;

impl Expiry<String, Arc<CounterCell>> for CounterExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<CounterCell>,
        _current_time: Instant,
    ) -> Option<Duration> {
        Some(value.window)
    }
}

/// In-process counter store.
///
/// Backed by a `moka` cache with per-entry expiry. The insert-if-absent
/// entry API guarantees a single winner when concurrent first-requests race
/// to initialize the same key.
pub struct MemoryCounterStore {
    cells: Cache<String, Arc<CounterCell>>,
}

impl MemoryCounterStore {
    /// Create a store holding at most `capacity` live counters.
    pub fn new(capacity: u64) -> Self {
        let cells = Cache::builder()
            .max_capacity(capacity)
            .expire_after(CounterExpiry)
            .build();

        Self { cells }
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<CounterEntry>> {
        let now = Instant::now();
        Ok(self
            .cells
            .get(key)
            .await
            .filter(|cell| cell.is_live(now))
            .map(|cell| CounterEntry {
                count: cell.count.load(Ordering::SeqCst),
                expires_at: cell.expires_at,
            }))
    }

    async fn initialize(&self, key: &str, window: Duration) -> Result<InitOutcome> {
        let entry = self
            .cells
            .entry(key.to_string())
            .or_insert_with(async { Arc::new(CounterCell::new(window)) })
            .await;

        if entry.is_fresh() {
            Ok(InitOutcome::Created)
        } else {
            Ok(InitOutcome::AlreadyExists)
        }
    }

    async fn increment(&self, key: &str) -> Result<Option<u64>> {
        let now = Instant::now();
        match self.cells.get(key).await {
            Some(cell) if cell.is_live(now) => {
                Ok(Some(cell.count.fetch_add(1, Ordering::SeqCst) + 1))
            }
            _ => Ok(None),
        }
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

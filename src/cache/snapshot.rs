//! Whole-result snapshot cache.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

use super::{InvalidationBus, Topic};

/// Holds at most one copy of a query result.
///
/// The snapshot is either absent or present; it only becomes present after a
/// successful population and only becomes absent on invalidation.
///
/// This cache is:
/// - Thread-safe and clone-friendly (clones share the same snapshot)
/// - Population-serialized (concurrent misses run the loader once)
/// - Generation-checked (a load that raced an invalidation is not stored)
pub struct SnapshotCache<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    name: Arc<str>,
    slot: RwLock<Option<Arc<Vec<T>>>>,
    generation: AtomicU64,
    populate: Mutex<()>,
}

impl<T> Inner<T> {
    fn invalidate(&self) {
        let mut slot = self.slot.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        if slot.take().is_some() {
            debug!("Cache '{}' invalidated", self.name);
        }
    }
}

// Manual Clone implementation that doesn't require T: Clone
impl<T> Clone for SnapshotCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SnapshotCache<T>
where
    T: Send + Sync + 'static,
{
    /// Create an empty snapshot cache.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                slot: RwLock::new(None),
                generation: AtomicU64::new(0),
                populate: Mutex::new(()),
            }),
        }
    }

    /// Clear this cache whenever `topic` is signalled.
    ///
    /// The bus only keeps a weak reference, so it never extends the
    /// lifetime of the cached data.
    pub fn subscribe_to(&self, bus: &InvalidationBus, topic: Topic) {
        let weak = Arc::downgrade(&self.inner);
        bus.subscribe(topic, move || {
            if let Some(inner) = weak.upgrade() {
                inner.invalidate();
            }
        });
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current snapshot, if present.
    pub fn get(&self) -> Option<Arc<Vec<T>>> {
        self.inner.slot.read().clone()
    }

    pub fn is_present(&self) -> bool {
        self.inner.slot.read().is_some()
    }

    /// Drop the snapshot. The next read repopulates.
    pub fn invalidate(&self) {
        self.inner.invalidate();
    }

    /// Number of invalidations seen so far.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Return the snapshot, or await `load` to populate it.
    ///
    /// `load` is only polled on a miss. Concurrent misses wait for the first
    /// population instead of each running their own. If the cache is
    /// invalidated while `load` runs, the result is returned to this caller
    /// but not stored.
    pub async fn get_or_try_populate<F, E>(&self, load: F) -> Result<Arc<Vec<T>>, E>
    where
        F: Future<Output = Result<Vec<T>, E>>,
    {
        if let Some(snapshot) = self.get() {
            return Ok(snapshot);
        }

        let _populating = self.inner.populate.lock().await;

        // Populated by whoever held the lock before us.
        if let Some(snapshot) = self.get() {
            return Ok(snapshot);
        }

        let generation = self.generation();
        debug!("Cache '{}' miss, populating", self.inner.name);

        let rows = Arc::new(load.await?);

        let mut slot = self.inner.slot.write();
        if self.inner.generation.load(Ordering::Acquire) == generation {
            *slot = Some(Arc::clone(&rows));
            debug!("Cache '{}' populated with {} rows", self.inner.name, rows.len());
        } else {
            debug!(
                "Cache '{}' invalidated during population, result not stored",
                self.inner.name
            );
        }

        Ok(rows)
    }
}

impl<T> std::fmt::Debug for SnapshotCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("name", &self.inner.name)
            .field("present", &self.inner.slot.read().is_some())
            .field("generation", &self.inner.generation.load(Ordering::Relaxed))
            .finish()
    }
}

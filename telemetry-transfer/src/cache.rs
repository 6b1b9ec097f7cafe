use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use moka::sync::Cache;
use tracing::trace;

use crate::event::SessionData;

/// Session state keyed by session id, holding the `data` of each session's START event.
pub trait SessionCache: Send + Sync {
    /// Look up a session, marking it as recently used.
    fn get(&self, session_id: &str) -> Option<SessionData>;
    /// Store a session, replacing any previous entry for the same id.
    fn put(&self, session_id: String, data: SessionData);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded least-recently-used session cache.
///
/// A capacity of zero disables caching: every `put` is dropped.
pub struct LruSessionCache {
    inner: Option<Mutex<LruCache<String, SessionData>>>,
}

impl LruSessionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|capacity| Mutex::new(LruCache::new(capacity))),
        }
    }

    fn lock(&self) -> Option<MutexGuard<'_, LruCache<String, SessionData>>> {
        // Every cache operation leaves the map consistent, so a poisoned lock is still usable.
        self.inner
            .as_ref()
            .map(|inner| inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

impl SessionCache for LruSessionCache {
    fn get(&self, session_id: &str) -> Option<SessionData> {
        self.lock()?.get(session_id).cloned()
    }

    fn put(&self, session_id: String, data: SessionData) {
        let Some(mut cache) = self.lock() else {
            return;
        };

        // `push` also hands back the previous value of a key that was already present.
        if let Some((evicted, _)) = cache.push(session_id.clone(), data) {
            if evicted != session_id {
                trace!(session_id = %evicted, "evicted least recently used session");
            }
        }
    }

    fn len(&self) -> usize {
        self.lock().map_or(0, |cache| cache.len())
    }
}

/// Session cache that additionally expires sessions after an idle period.
pub struct TtlSessionCache {
    inner: Cache<String, SessionData>,
}

impl TtlSessionCache {
    pub fn new(capacity: usize, time_to_idle: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity as u64)
            .time_to_idle(time_to_idle)
            .build();

        Self { inner }
    }
}

impl SessionCache for TtlSessionCache {
    fn get(&self, session_id: &str) -> Option<SessionData> {
        self.inner.get(session_id)
    }

    fn put(&self, session_id: String, data: SessionData) {
        self.inner.insert(session_id, data);
    }

    fn len(&self) -> usize {
        self.inner.run_pending_tasks();
        self.inner.entry_count() as usize
    }
}

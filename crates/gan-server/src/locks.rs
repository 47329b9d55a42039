//! Per-session mutual exclusion (§9 "per-session mutual exclusion"): a keyed lock map so
//! that two requests for the same session id never interleave, while unrelated sessions run
//! fully in parallel. The map itself is guarded by a short-lived `Mutex`; the per-session
//! lock is held across an entire audit cycle by the caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;

/// A keyed map of `tokio::sync::Mutex`, one per session id, created lazily and garbage
/// collected when no other holder remains.
#[derive(Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        SessionLocks { inner: Mutex::new(HashMap::new()) }
    }

    /// Acquire the lock for `session_id`, creating its entry if this is the first caller.
    /// The returned guard releases the lock on drop; the map entry is reclaimed opportunistically
    /// by [`SessionLocks::collect_idle`], not eagerly, since a fresh waiter may arrive the
    /// instant an entry would otherwise be dropped.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().unwrap();
            map.entry(session_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        entry.lock_owned().await
    }

    /// Drop map entries whose only remaining reference is the map itself (no in-flight
    /// audit currently holds or awaits them). Safe to call from the periodic cleanup task
    /// (§9) since it never blocks on an outstanding lock.
    pub fn collect_idle(&self) {
        let mut map = self.inner.lock().unwrap();
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

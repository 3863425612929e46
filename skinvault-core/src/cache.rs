//! In-memory cache with per-entry expiry and a background sweep task
//!
//! Reads check expiry lazily, so an expired entry is never returned even if
//! the sweep has not reached it yet. The sweep only bounds memory.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::clock::{deadline, FAR_FUTURE};

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// `None` once the cache is closed
type Entries<V> = Arc<RwLock<Option<HashMap<String, CacheEntry<V>>>>>;

struct Sweeper {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Key/value store where every entry carries its own time-to-live
///
/// Dropping the cache without calling [`close`](Self::close) drops the stop
/// sender, which ends the sweep task on its next poll.
pub struct ExpiringCache<V> {
    entries: Entries<V>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<V> ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache and start its sweep task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(sweep_interval: Duration) -> Self {
        // tokio intervals panic on a zero period
        let sweep_interval = sweep_interval.clamp(Duration::from_millis(1), FAR_FUTURE);
        let entries: Entries<V> = Arc::new(RwLock::new(Some(HashMap::new())));
        let (stop, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_sweeper(Arc::clone(&entries), sweep_interval, stop_rx));

        Self {
            entries,
            sweeper: Mutex::new(Some(Sweeper { stop, handle })),
        }
    }

    /// Store `value` under `key`, visible until `ttl` from now
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = deadline(Instant::now(), ttl);
        if let Some(map) = write(&self.entries).as_mut() {
            map.insert(key.into(), CacheEntry { value, expires_at });
        }
    }

    /// Return the value stored under `key` if it has not expired
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let guard = read(&self.entries);
        let entry = guard.as_ref()?.get(key)?;
        if entry.expires_at > now {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Remove the given keys; missing keys are ignored
    pub fn delete<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        if let Some(map) = write(&self.entries).as_mut() {
            for key in keys {
                map.remove(key.as_ref());
            }
        }
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        read(&self.entries).as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry and return how many were removed
    pub fn evict_expired(&self) -> usize {
        evict(&self.entries)
    }

    /// Stop the sweep task, wait for it, and release all entries.
    ///
    /// Safe to call more than once and from several tasks at once: later
    /// callers wait for the first close to finish and then return.
    pub async fn close(&self) {
        let mut sweeper = self.sweeper.lock().await;
        let Some(Sweeper { stop, handle }) = sweeper.take() else {
            return;
        };

        // The task may already have exited if the runtime is shutting down
        let _ = stop.send(());
        if let Err(e) = handle.await {
            log::error!("Cache sweep task failed: {}", e);
        }

        *write(&self.entries) = None;
        log::debug!("Cache closed");
    }
}

async fn run_sweeper<V>(entries: Entries<V>, every: Duration, mut stop: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval_at(deadline(Instant::now(), every), every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Fires on an explicit stop and when the cache is dropped
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let removed = evict(&entries);
                if removed > 0 {
                    log::debug!("Cache sweep removed {} expired entries", removed);
                }
            }
        }
    }
}

fn evict<V>(entries: &Entries<V>) -> usize {
    let now = Instant::now();
    let mut guard = write(entries);
    let Some(map) = guard.as_mut() else {
        return 0;
    };
    let before = map.len();
    map.retain(|_, entry| entry.expires_at > now);
    before - map.len()
}

// A panic while holding the lock cannot leave the map half-updated, so a
// poisoned lock is still safe to use.
fn read<V>(entries: &Entries<V>) -> RwLockReadGuard<'_, Option<HashMap<String, CacheEntry<V>>>> {
    entries.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<V>(entries: &Entries<V>) -> RwLockWriteGuard<'_, Option<HashMap<String, CacheEntry<V>>>> {
    entries.write().unwrap_or_else(PoisonError::into_inner)
}

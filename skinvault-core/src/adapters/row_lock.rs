//! Per-user exclusive locks shared by the ledger adapters

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>;

fn lock_map(locks: &LockMap) -> MutexGuard<'_, HashMap<i64, Arc<AsyncMutex<()>>>> {
    locks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A claim on one user's map entry, held while waiting and while locked
///
/// The last claim to go removes the entry.
#[derive(Debug)]
struct Claim {
    user_id: i64,
    lock: Arc<AsyncMutex<()>>,
    locks: LockMap,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut locks = lock_map(&self.locks);
        // One reference in the map, one here
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.user_id);
        }
    }
}

/// Guard for one user's row; the lock is released when it is dropped
#[derive(Debug)]
pub struct RowGuard {
    // Field order matters: the mutex is released before the claim is dropped
    _guard: OwnedMutexGuard<()>,
    _claim: Claim,
}

/// Lazily created async mutex per user id
///
/// Different users never contend. Waiters queue in FIFO order. An entry
/// lives only while some caller holds or waits for it.
#[derive(Debug, Default)]
pub struct RowLocks {
    locks: LockMap,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock on `user_id`
    pub async fn lock(&self, user_id: i64) -> RowGuard {
        let claim = {
            let mut locks = lock_map(&self.locks);
            Claim {
                user_id,
                lock: Arc::clone(locks.entry(user_id).or_default()),
                locks: Arc::clone(&self.locks),
            }
        };
        let guard = Arc::clone(&claim.lock).lock_owned().await;
        RowGuard {
            _guard: guard,
            _claim: claim,
        }
    }

    /// Number of users currently held or waited on
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

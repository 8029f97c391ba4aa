//! In-process single-flight and serialisation locks
//!
//! Two registries with different shapes:
//!
//! - `DiscoveryLocks`: try-lock per user. A second discovery for the same
//!   user while one is running is a caller error (`Conflict`), not a queue.
//! - `MatchKeyLocks`: blocking lock per (user, payee, direction, currency)
//!   key. Matcher operations on one key are strictly serialised so
//!   obligation transitions stay linearly ordered and streak updates are
//!   never lost; different keys proceed in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::models::Direction;

/// Per-user single-flight for the discovery path
#[derive(Default)]
pub struct DiscoveryLocks {
    in_flight: Mutex<HashSet<i64>>,
}

impl DiscoveryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the user's discovery slot, or fail with Conflict if a run
    /// is already in flight. The guard releases the slot on drop, so a
    /// panicking or cancelled run never wedges the user.
    pub fn try_acquire(self: &Arc<Self>, user_id: i64) -> Result<DiscoveryGuard> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(user_id) {
            return Err(Error::Conflict(format!(
                "Discovery already running for user {}",
                user_id
            )));
        }
        Ok(DiscoveryGuard {
            locks: Arc::clone(self),
            user_id,
        })
    }
}

pub struct DiscoveryGuard {
    locks: Arc<DiscoveryLocks>,
    user_id: i64,
}

impl Drop for DiscoveryGuard {
    fn drop(&mut self) {
        self.locks.in_flight.lock().remove(&self.user_id);
    }
}

/// The identity a matcher unit of work is serialised on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub user_id: i64,
    pub payee_id: i64,
    pub direction: Direction,
    pub currency_id: i64,
}

/// Per-key mutexes for the runtime matcher
#[derive(Default)]
pub struct MatchKeyLocks {
    inner: Mutex<HashMap<MatchKey, Arc<Mutex<()>>>>,
}

impl MatchKeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex for a key, created on first use. Callers lock the
    /// returned handle for the duration of their unit of work.
    pub fn for_key(&self, key: MatchKey) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock();
        Arc::clone(map.entry(key).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_single_flight() {
        let locks = Arc::new(DiscoveryLocks::new());

        let guard = locks.try_acquire(1).unwrap();
        assert!(locks.try_acquire(1).is_err());
        // other users are unaffected
        let _other = locks.try_acquire(2).unwrap();

        drop(guard);
        assert!(locks.try_acquire(1).is_ok());
    }

    #[test]
    fn test_match_key_locks_are_per_key() {
        let locks = MatchKeyLocks::new();
        let key_a = MatchKey {
            user_id: 1,
            payee_id: 1,
            direction: Direction::Debit,
            currency_id: 1,
        };
        let key_b = MatchKey {
            payee_id: 2,
            ..key_a
        };

        let mutex_a = locks.for_key(key_a);
        let _held = mutex_a.lock();
        // same key resolves to the same mutex
        assert!(locks.for_key(key_a).try_lock().is_none());
        // different key is free
        assert!(locks.for_key(key_b).try_lock().is_some());
    }
}

//! # KeyMutex: pooled, reference-counted per-key mutual exclusion.
//!
//! `lock(key)` serializes critical sections that share a key; distinct keys
//! never block each other. Per-key locks are created lazily and recycled
//! through a pool, so memory stays bounded even when the key space is
//! unbounded (entry count tracks *active* keys, not ever-seen keys).
//!
//! ## Bookkeeping
//! ```text
//! lock(k):   registry lock ─► entry(k).count += 1 (create from pool if absent)
//!            registry unlock
//!            await entry lock            (outside the registry guard!)
//!            └─► KeyGuard
//!
//! drop(KeyGuard):
//!            release entry lock
//!            registry lock ─► entry(k).count -= 1
//!                             count == 0 → remove entry, pool the lock
//!            registry unlock
//! ```
//!
//! ## Rules
//! - The registry guard is held for bookkeeping only, never across the
//!   caller's critical section.
//! - `count` tracks holders **and** waiters, so an entry is removed only when
//!   nobody references its lock — which is what makes pooling safe.
//! - A `lock()` future dropped before acquisition gives its reference back;
//!   canceled waiters cannot strand an entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key entry: the shared lock plus its holder/waiter count.
struct Entry {
    lock: Arc<AsyncMutex<()>>,
    count: usize,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, Entry>,
    pool: Vec<Arc<AsyncMutex<()>>>,
}

/// Mutual exclusion scoped to a string key rather than a fixed variable.
#[derive(Default)]
pub struct KeyMutex {
    registry: StdMutex<Registry>,
}

impl KeyMutex {
    /// Creates an empty key mutex.
    pub fn new() -> Self {
        Self::default()
    }

    /// Composes a hierarchical key from its parts.
    pub fn join_key<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
        parts.into_iter().collect::<Vec<_>>().join("/")
    }

    /// Blocks until the caller holds exclusive access scoped to `key`.
    ///
    /// The returned [`KeyGuard`] releases on drop (or via
    /// [`unlock`](KeyGuard::unlock)) — exactly once, by construction.
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let lock = self.acquire_entry(key);

        // Dropped before acquisition completes → the waiter reference is
        // returned; disarmed once the guard exists.
        let mut waiter = WaiterRef {
            owner: self,
            key,
            armed: true,
        };
        let permit = lock.lock_owned().await;
        waiter.armed = false;

        KeyGuard {
            owner: self,
            key: key.to_string(),
            permit: Some(permit),
        }
    }

    /// Number of keys with at least one active holder or waiter.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry().entries.len()
    }

    /// True when no key is held or waited on.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry().entries.is_empty()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers one holder/waiter for `key` and returns the entry's lock.
    fn acquire_entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut registry = self.registry();
        match registry.entries.get_mut(key) {
            Some(entry) => {
                entry.count += 1;
                Arc::clone(&entry.lock)
            }
            None => {
                let lock = registry
                    .pool
                    .pop()
                    .unwrap_or_else(|| Arc::new(AsyncMutex::new(())));
                registry.entries.insert(
                    key.to_string(),
                    Entry {
                        lock: Arc::clone(&lock),
                        count: 1,
                    },
                );
                lock
            }
        }
    }

    /// Drops one holder/waiter reference for `key`.
    fn release_entry(&self, key: &str) {
        let mut registry = self.registry();
        let drained = match registry.entries.get_mut(key) {
            Some(entry) => {
                entry.count -= 1;
                entry.count == 0
            }
            None => false,
        };
        if drained {
            if let Some(entry) = registry.entries.remove(key) {
                registry.pool.push(entry.lock);
            }
        }
    }
}

/// Reference held while waiting for acquisition; returns it if the wait is
/// abandoned.
struct WaiterRef<'a> {
    owner: &'a KeyMutex,
    key: &'a str,
    armed: bool,
}

impl Drop for WaiterRef<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.owner.release_entry(self.key);
        }
    }
}

/// Exclusive access to a key; releases on drop.
#[must_use = "dropping the guard immediately releases the key"]
pub struct KeyGuard<'a> {
    owner: &'a KeyMutex,
    key: String,
    permit: Option<OwnedMutexGuard<()>>,
}

impl KeyGuard<'_> {
    /// Returns the guarded key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the key explicitly (equivalent to dropping the guard).
    pub fn unlock(self) {}
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Release the critical section first, then the bookkeeping reference.
        if let Some(permit) = self.permit.take() {
            drop(permit);
            self.owner.release_entry(&self.key);
        }
    }
}

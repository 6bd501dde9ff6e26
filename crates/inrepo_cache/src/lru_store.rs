//! Bounded LRU store with single-flight construction.
//!
//! [`LruStore::get_or_add`] returns the resident value for a key or builds it
//! with the supplied constructor. Concurrent callers asking for the same
//! missing key share one construction: exactly one constructor runs and every
//! waiter receives its value, or its error.
//!
//! # Bookkeeping
//!
//! ```text
//!            get_or_add(k)
//!                 │
//!     resident? ──┴── yes ──► (value, hit)
//!         │
//!         no
//!         ▼
//!   pending slot for k (created or joined)
//!         │
//!   constructor ── Ok ──► move to resident, fire Capacity evictions
//!         │
//!        Err ──► drop slot, fire Invalidated(k)
//! ```
//!
//! A constructed value is resident before eviction callbacks for the keys it
//! displaced fire, and callbacks always run outside the store lock, so a
//! callback may call back into the store.
//!
//! Dropping a caller in the middle of a construction is safe: one of the
//! remaining waiters, or the next caller, runs its own constructor instead.

use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::debug;

#[cfg(test)]
#[path = "lru_store_tests.rs"]
mod tests;

/// Why an entry left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Displaced by a newer entry because the store was full.
    Capacity,

    /// Removed explicitly, or dropped after its construction failed.
    Invalidated,
}

/// Called with the key, the evicted value (absent for a failed construction)
/// and the reason.
pub type EvictionCallback<K, V> = Box<dyn Fn(&K, Option<&Arc<V>>, EvictionReason) + Send + Sync>;

type Slot<V, E> = Arc<OnceCell<Result<Arc<V>, E>>>;

struct Inner<K: Hash + Eq, V: ?Sized, E> {
    resident: LruCache<K, Arc<V>>,
    pending: HashMap<K, Slot<V, E>>,
}

/// A least-recently-used store of shared, immutable values.
pub struct LruStore<K: Hash + Eq, V: ?Sized, E> {
    inner: Mutex<Inner<K, V, E>>,
    on_evict: Option<EvictionCallback<K, V>>,
}

impl<K, V, E> LruStore<K, V, E>
where
    K: Hash + Eq + Clone,
    V: ?Sized,
    E: Clone,
{
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                resident: LruCache::new(capacity),
                pending: HashMap::new(),
            }),
            on_evict: None,
        }
    }

    /// Registers the eviction callback.
    pub fn with_eviction_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&K, Option<&Arc<V>>, EvictionReason) + Send + Sync + 'static,
    {
        self.on_evict = Some(Box::new(callback));
        self
    }

    // Critical sections never leave the maps half-updated; poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Inner<K, V, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, key: &K, value: Option<&Arc<V>>, reason: EvictionReason) {
        if let Some(callback) = &self.on_evict {
            callback(key, value, reason);
        }
    }

    /// Returns the value for `key`, constructing it when absent.
    ///
    /// The flag is `true` when this call did not run the constructor, either
    /// because the value was resident or because another caller built it.
    ///
    /// # Errors
    ///
    /// Returns the constructor's error. Failed constructions are not cached:
    /// the next call for the key constructs again.
    pub async fn get_or_add<F, Fut>(&self, key: K, constructor: F) -> Result<(Arc<V>, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<V>, E>>,
    {
        let slot = {
            let mut inner = self.lock();
            if let Some(value) = inner.resident.get(&key) {
                return Ok((value.clone(), true));
            }
            inner
                .pending
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let constructed = AtomicBool::new(false);
        let flag = &constructed;
        let result = slot
            .get_or_init(|| async move {
                flag.store(true, Ordering::Release);
                constructor().await
            })
            .await
            .clone();

        if !constructed.load(Ordering::Acquire) {
            return result.map(|value| (value, true));
        }

        match result {
            Ok(value) => {
                let displaced = {
                    let mut inner = self.lock();
                    Self::remove_pending(&mut inner, &key, &slot);
                    inner.resident.push(key.clone(), value.clone())
                };
                if let Some((old_key, old_value)) = displaced {
                    if old_key != key {
                        debug!("Evicting least recently used entry");
                        self.notify(&old_key, Some(&old_value), EvictionReason::Capacity);
                    }
                }
                Ok((value, false))
            }
            Err(error) => {
                {
                    let mut inner = self.lock();
                    Self::remove_pending(&mut inner, &key, &slot);
                }
                self.notify(&key, None, EvictionReason::Invalidated);
                Err(error)
            }
        }
    }

    fn remove_pending(inner: &mut Inner<K, V, E>, key: &K, slot: &Slot<V, E>) {
        let ours = inner
            .pending
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot));
        if ours {
            inner.pending.remove(key);
        }
    }

    /// Returns a resident value and marks it most recently used.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.lock().resident.get(key).cloned()
    }

    /// Whether a value is resident, without touching its recency.
    pub fn contains(&self, key: &K) -> bool {
        self.lock().resident.contains(key)
    }

    /// Removes a resident value. Returns `false` when nothing was resident.
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.lock().resident.pop(key);
        match removed {
            Some(value) => {
                self.notify(key, Some(&value), EvictionReason::Invalidated);
                true
            }
            None => false,
        }
    }

    /// Resident keys, most recently used first.
    pub fn keys(&self) -> Vec<K> {
        self.lock()
            .resident
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().resident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.lock().resident.cap()
    }
}

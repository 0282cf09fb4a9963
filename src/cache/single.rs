use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::foundation::error::SkelterResult;

/// Single-phase asynchronous cache.
///
/// Holds `K -> V` plus the set of keys currently being computed in the
/// background. Lookups never compute; a miss is answered with `None` and the
/// caller decides whether to schedule a background fill ([`Cache::load_async`])
/// or compute on the spot ([`Cache::load_sync`]).
///
/// Values are cheap to clone (handles or `Arc`s); the cache hands out clones.
/// Cloning the cache itself shares the underlying state.
pub struct Cache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

type ComputeFn<K, V> = dyn Fn(&K) -> SkelterResult<V> + Send + Sync;

struct Inner<K, V> {
    label: &'static str,
    compute: Box<ComputeFn<K, V>>,
    state: Mutex<State<K, V>>,
}

struct State<K, V> {
    values: HashMap<K, V>,
    in_flight: HashSet<K>,
    epoch: u64,
}

impl<K, V> Inner<K, V> {
    fn state(&self) -> MutexGuard<'_, State<K, V>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes the in-flight marker when the background task exits, on every path
/// including unwinds. A key must never stay marked after its task is gone or
/// it could never be loaded again.
struct InFlightGuard<'a, K: Eq + Hash, V> {
    inner: &'a Inner<K, V>,
    key: &'a K,
}

impl<K: Eq + Hash, V> Drop for InFlightGuard<'_, K, V> {
    fn drop(&mut self) {
        self.inner.state().in_flight.remove(self.key);
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache with a compute strategy. `label` names the cache in logs.
    pub fn new(
        label: &'static str,
        compute: impl Fn(&K) -> SkelterResult<V> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                label,
                compute: Box::new(compute),
                state: Mutex::new(State {
                    values: HashMap::new(),
                    in_flight: HashSet::new(),
                    epoch: 0,
                }),
            }),
        }
    }

    /// Lookup without side effects. Never computes, never blocks on a compute.
    pub fn get_or_none(&self, key: &K) -> Option<V> {
        self.inner.state().values.get(key).cloned()
    }

    /// Return the cached value, computing it on the calling thread on a miss.
    pub fn load_sync(&self, key: &K) -> SkelterResult<V> {
        if let Some(value) = self.get_or_none(key) {
            return Ok(value);
        }
        let value = (self.inner.compute)(key)?;
        let mut state = self.inner.state();
        // A background fill may have landed while we were computing; keep the
        // published value so every holder sees the same one.
        let value = state
            .values
            .entry(key.clone())
            .or_insert(value)
            .clone();
        Ok(value)
    }

    /// Schedule a background compute for `key` unless it is already cached or
    /// already in flight. Returns immediately.
    ///
    /// A failed compute is logged and leaves no entry, so a later call retries.
    /// The in-flight marker is cleared however the task exits.
    pub fn load_async(&self, key: &K) {
        let epoch = {
            let mut state = self.inner.state();
            if state.values.contains_key(key) || !state.in_flight.insert(key.clone()) {
                return;
            }
            state.epoch
        };
        tracing::debug!(cache = self.inner.label, key = ?key, "scheduling background load");

        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        rayon::spawn(move || {
            let _guard = InFlightGuard {
                inner: &inner,
                key: &key,
            };
            match (inner.compute)(&key) {
                Ok(value) => {
                    let mut state = inner.state();
                    if state.epoch == epoch {
                        state.values.insert(key.clone(), value);
                    }
                    // An older epoch means the cache was cleared while we were
                    // computing; the result is stale and simply dropped.
                }
                Err(err) => {
                    tracing::error!(
                        cache = inner.label,
                        key = ?key,
                        %err,
                        "background load failed"
                    );
                }
            }
        });
    }

    /// Drop every cached value. Results of computes still in flight are
    /// discarded when they complete.
    pub fn clear(&self) {
        let mut state = self.inner.state();
        state.epoch += 1;
        state.values.clear();
    }

    /// Number of cached values (in-flight computes not included).
    pub fn len(&self) -> usize {
        self.inner.state().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/single.rs"]
mod tests;

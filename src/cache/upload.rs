use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::foundation::error::SkelterResult;

/// Strategy for a two-phase cache: decode on a worker thread, finish on the
/// thread that owns the device.
///
/// `Device` is whatever grants access to the GPU (typically
/// `dyn TextureDevice`). Every hook that touches it takes `&mut Device`, so
/// the only code that can create or destroy device resources is code that
/// holds the device exclusively.
pub trait UploadOps: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static;
    type Intermediate: Send + 'static;
    type Value: Clone + Send + 'static;
    type Device: ?Sized;

    /// Produce the intermediate for a key. Runs on a worker thread.
    fn decode(&self, key: &Self::Key) -> SkelterResult<Self::Intermediate>;

    /// Convert an intermediate into the final value. Device thread only.
    fn to_gpu(
        &self,
        intermediate: Self::Intermediate,
        dev: &mut Self::Device,
    ) -> SkelterResult<Self::Value>;

    /// Destroy a value's device resources. Device thread only.
    fn release_value(&self, value: Self::Value, dev: &mut Self::Device);

    /// Dispose of an intermediate that will never be uploaded. May run on any
    /// thread; the default just drops it.
    fn release_intermediate(&self, intermediate: Self::Intermediate) {
        drop(intermediate);
    }
}

/// Two-phase asynchronous cache for device-resident values.
///
/// Workers decode intermediates; completed intermediates queue up in
/// decode-completion order and are converted by [`UploadCache::upload`] on the
/// device thread, a bounded number per call. [`UploadCache::clear`] is safe
/// from any thread: evicted values park in a deletion queue and are released
/// by the next `upload`, so no device call ever happens off the device thread.
pub struct UploadCache<O: UploadOps> {
    inner: Arc<Inner<O>>,
}

impl<O: UploadOps> Clone for UploadCache<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<O: UploadOps> {
    label: &'static str,
    ops: O,
    state: Mutex<State<O>>,
}

struct State<O: UploadOps> {
    values: HashMap<O::Key, O::Value>,
    /// Decoded intermediates awaiting upload, in completion order.
    pending: VecDeque<(O::Key, O::Intermediate)>,
    /// Keys that are either decoding or sitting in `pending`, tagged with the
    /// epoch they were queued under so a stale task cannot unmark a key that
    /// was legitimately re-queued after a clear.
    queued: HashMap<O::Key, u64>,
    /// Values evicted off the device thread, awaiting release on it.
    deleted: Vec<O::Value>,
    epoch: u64,
}

impl<O: UploadOps> Inner<O> {
    fn state(&self) -> MutexGuard<'_, State<O>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the queued marker when a decode task exits without publishing, on
/// every path including unwinds. Disarmed when the intermediate makes it into
/// the pending queue (the marker then belongs to the queue entry).
struct QueuedGuard<'a, O: UploadOps> {
    inner: &'a Inner<O>,
    key: &'a O::Key,
    epoch: u64,
    armed: bool,
}

impl<O: UploadOps> QueuedGuard<'_, O> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<O: UploadOps> Drop for QueuedGuard<'_, O> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.inner.state();
            if state.queued.get(self.key) == Some(&self.epoch) {
                state.queued.remove(self.key);
            }
        }
    }
}

impl<O: UploadOps> UploadCache<O> {
    /// Create a cache around an upload strategy. `label` names it in logs.
    pub fn new(label: &'static str, ops: O) -> Self {
        Self {
            inner: Arc::new(Inner {
                label,
                ops,
                state: Mutex::new(State {
                    values: HashMap::new(),
                    pending: VecDeque::new(),
                    queued: HashMap::new(),
                    deleted: Vec::new(),
                    epoch: 0,
                }),
            }),
        }
    }

    /// Lookup without side effects.
    pub fn get_or_none(&self, key: &O::Key) -> Option<O::Value> {
        self.inner.state().values.get(key).cloned()
    }

    /// Schedule a background decode for `key` unless it is cached, decoding,
    /// or already awaiting upload. Returns immediately.
    ///
    /// On failure the queued marker is dropped (guard) and an error is logged;
    /// the key can be retried. A decode that completes after [`Self::clear`]
    /// releases its intermediate instead of publishing it.
    pub fn load_async(&self, key: &O::Key) {
        let epoch = {
            let mut state = self.inner.state();
            if state.values.contains_key(key) || state.queued.contains_key(key) {
                return;
            }
            let epoch = state.epoch;
            state.queued.insert(key.clone(), epoch);
            epoch
        };
        tracing::debug!(cache = self.inner.label, key = ?key, "scheduling background decode");

        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        rayon::spawn(move || {
            let mut guard = QueuedGuard {
                inner: &inner,
                key: &key,
                epoch,
                armed: true,
            };
            match inner.ops.decode(&key) {
                Ok(intermediate) => {
                    let stale = {
                        let mut state = inner.state();
                        if state.epoch == epoch {
                            state.pending.push_back((key.clone(), intermediate));
                            guard.disarm();
                            None
                        } else {
                            Some(intermediate)
                        }
                    };
                    if let Some(intermediate) = stale {
                        inner.ops.release_intermediate(intermediate);
                    }
                }
                Err(err) => {
                    tracing::error!(
                        cache = inner.label,
                        key = ?key,
                        %err,
                        "background decode failed"
                    );
                }
            }
        });
    }

    /// Return the cached value, decoding and uploading on the calling thread
    /// on a miss. Device thread only.
    pub fn load_sync(&self, key: &O::Key, dev: &mut O::Device) -> SkelterResult<O::Value> {
        if let Some(value) = self.get_or_none(key) {
            return Ok(value);
        }
        let intermediate = self.inner.ops.decode(key)?;
        let value = self.inner.ops.to_gpu(intermediate, dev)?;
        let mut state = self.inner.state();
        if let Some(old) = state.values.insert(key.clone(), value.clone()) {
            // Displaced values still get released on the device thread.
            state.deleted.push(old);
        }
        Ok(value)
    }

    /// Hand the cache an externally produced intermediate for `key`, queued
    /// for upload like any decoded one. Dropped (and released) if the key is
    /// already cached or queued.
    pub fn insert_precomputed(&self, key: O::Key, intermediate: O::Intermediate) {
        let rejected = {
            let mut state = self.inner.state();
            if state.values.contains_key(&key) || state.queued.contains_key(&key) {
                Some(intermediate)
            } else {
                let epoch = state.epoch;
                state.queued.insert(key.clone(), epoch);
                state.pending.push_back((key, intermediate));
                None
            }
        };
        if let Some(intermediate) = rejected {
            self.inner.ops.release_intermediate(intermediate);
        }
    }

    /// Service the cache from the device thread: release everything in the
    /// deletion queue, then convert at most `max` pending intermediates, in
    /// decode-completion order. Returns how many values were stored.
    ///
    /// A pending key that was satisfied by [`Self::load_sync`] in the meantime
    /// skips conversion; its intermediate is released.
    pub fn upload(&self, max: usize, dev: &mut O::Device) -> usize {
        let deleted = {
            let mut state = self.inner.state();
            std::mem::take(&mut state.deleted)
        };
        if !deleted.is_empty() {
            tracing::debug!(cache = self.inner.label, count = deleted.len(), "releasing evicted values");
            for value in deleted {
                self.inner.ops.release_value(value, dev);
            }
        }

        let mut stored = 0;
        for _ in 0..max {
            let popped = {
                let mut state = self.inner.state();
                match state.pending.pop_front() {
                    Some((key, intermediate)) => {
                        state.queued.remove(&key);
                        let already = state.values.contains_key(&key);
                        Some((key, intermediate, already))
                    }
                    None => None,
                }
            };
            let Some((key, intermediate, already)) = popped else {
                break;
            };
            if already {
                self.inner.ops.release_intermediate(intermediate);
                continue;
            }
            match self.inner.ops.to_gpu(intermediate, dev) {
                Ok(value) => {
                    self.inner.state().values.insert(key, value);
                    stored += 1;
                }
                Err(err) => {
                    tracing::error!(
                        cache = self.inner.label,
                        key = ?key,
                        %err,
                        "upload failed"
                    );
                }
            }
        }
        stored
    }

    /// Evict everything. Safe from any thread: cached values move to the
    /// deletion queue for the next [`Self::upload`] to release, pending
    /// intermediates are released here, and decodes still in flight discard
    /// their results when they complete.
    pub fn clear(&self) {
        let pending = {
            let mut state = self.inner.state();
            state.epoch += 1;
            let values = std::mem::take(&mut state.values);
            state.deleted.extend(values.into_values());
            state.queued.clear();
            std::mem::take(&mut state.pending)
        };
        for (_key, intermediate) in pending {
            self.inner.ops.release_intermediate(intermediate);
        }
    }

    /// Number of uploaded values.
    pub fn len(&self) -> usize {
        self.inner.state().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of decoded intermediates waiting for [`Self::upload`].
    pub fn pending_len(&self) -> usize {
        self.inner.state().pending.len()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/upload.rs"]
mod tests;

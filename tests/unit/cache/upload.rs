use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::*;
use crate::foundation::error::SkelterError;

fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("condition not reached within one second");
}

/// Fake device that logs create/release calls. `to_gpu` hands out ids in call
/// order, which makes upload ordering observable.
#[derive(Default)]
struct TestDevice {
    log: Vec<String>,
    next_id: u32,
}

struct TestOps {
    decodes: Arc<AtomicUsize>,
    delay: Duration,
    fail_key: Option<u32>,
}

impl TestOps {
    fn plain() -> Self {
        Self {
            decodes: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            fail_key: None,
        }
    }
}

impl UploadOps for TestOps {
    type Key = u32;
    type Intermediate = u32;
    type Value = (u32, u32);
    type Device = TestDevice;

    fn decode(&self, key: &u32) -> SkelterResult<u32> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail_key == Some(*key) {
            return Err(SkelterError::validation("scripted decode failure"));
        }
        Ok(key * 2)
    }

    fn to_gpu(&self, intermediate: u32, dev: &mut TestDevice) -> SkelterResult<(u32, u32)> {
        dev.next_id += 1;
        dev.log.push(format!("create {}", dev.next_id));
        Ok((dev.next_id, intermediate))
    }

    fn release_value(&self, value: (u32, u32), dev: &mut TestDevice) {
        dev.log.push(format!("release {}", value.0));
    }
}

#[test]
fn upload_budget_stores_n_and_leaves_rest_pending() {
    let cache = UploadCache::new("test", TestOps::plain());
    let mut dev = TestDevice::default();
    for key in 1..=5u32 {
        cache.insert_precomputed(key, key * 2);
    }
    assert_eq!(cache.pending_len(), 5);

    assert_eq!(cache.upload(3, &mut dev), 3);
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.pending_len(), 2);

    assert_eq!(cache.upload(10, &mut dev), 2);
    assert_eq!(cache.len(), 5);
    assert_eq!(cache.pending_len(), 0);
}

#[test]
fn uploads_run_in_completion_order() {
    let cache = UploadCache::new("test", TestOps::plain());
    let mut dev = TestDevice::default();
    cache.insert_precomputed(10, 20);
    cache.insert_precomputed(20, 40);
    cache.insert_precomputed(30, 60);

    assert_eq!(cache.upload(2, &mut dev), 2);
    assert_eq!(cache.get_or_none(&10), Some((1, 20)));
    assert_eq!(cache.get_or_none(&20), Some((2, 40)));
    assert_eq!(cache.get_or_none(&30), None);
}

#[test]
fn load_async_value_appears_after_upload() {
    let ops = TestOps::plain();
    let decodes = Arc::clone(&ops.decodes);
    let cache = UploadCache::new("test", ops);
    let mut dev = TestDevice::default();

    cache.load_async(&6);
    wait_for(|| cache.pending_len() == 1);
    // Decoded but not uploaded: still invisible to lookups, and a repeat
    // request does not decode again.
    assert_eq!(cache.get_or_none(&6), None);
    cache.load_async(&6);
    assert_eq!(decodes.load(Ordering::SeqCst), 1);

    assert_eq!(cache.upload(1, &mut dev), 1);
    assert_eq!(cache.get_or_none(&6), Some((1, 12)));
}

#[test]
fn upload_skips_keys_already_satisfied_by_load_sync() {
    let cache = UploadCache::new("test", TestOps::plain());
    let mut dev = TestDevice::default();
    cache.insert_precomputed(7, 14);
    let value = cache.load_sync(&7, &mut dev).unwrap();
    assert_eq!(value, (1, 14));

    // The stale pending entry is dropped, not uploaded over the live value.
    assert_eq!(cache.upload(4, &mut dev), 0);
    assert_eq!(cache.get_or_none(&7), Some((1, 14)));
    assert_eq!(dev.log, vec!["create 1"]);
}

#[test]
fn satisfied_pending_entry_consumes_budget_slot() {
    let cache = UploadCache::new("test", TestOps::plain());
    let mut dev = TestDevice::default();
    cache.insert_precomputed(1, 2);
    let _ = cache.load_sync(&1, &mut dev).unwrap();
    cache.insert_precomputed(2, 4);

    // The dead entry for key 1 eats the whole budget of this call.
    assert_eq!(cache.upload(1, &mut dev), 0);
    assert_eq!(cache.pending_len(), 1);
    assert_eq!(cache.upload(1, &mut dev), 1);
    assert_eq!(cache.get_or_none(&2), Some((2, 4)));
}

#[test]
fn clear_defers_releases_to_next_upload() {
    let cache = UploadCache::new("test", TestOps::plain());
    let mut dev = TestDevice::default();
    let _ = cache.load_sync(&1, &mut dev).unwrap();
    let _ = cache.load_sync(&2, &mut dev).unwrap();

    cache.clear();
    assert!(cache.is_empty());
    // Nothing touched the device yet.
    assert_eq!(dev.log, vec!["create 1", "create 2"]);

    cache.insert_precomputed(3, 6);
    assert_eq!(cache.upload(1, &mut dev), 1);

    // Deletions drain before any upload, in no particular order.
    let mut releases: Vec<&str> = dev.log[2..4].iter().map(String::as_str).collect();
    releases.sort_unstable();
    assert_eq!(releases, vec!["release 1", "release 2"]);
    assert_eq!(dev.log[4], "create 3");
}

#[test]
fn clear_is_safe_off_the_device_thread() {
    let cache = UploadCache::new("test", TestOps::plain());
    let mut dev = TestDevice::default();
    let _ = cache.load_sync(&1, &mut dev).unwrap();

    let off_thread = cache.clone();
    thread::spawn(move || off_thread.clear()).join().unwrap();

    // The other thread never called into the device.
    assert_eq!(dev.log, vec!["create 1"]);
    assert_eq!(cache.upload(0, &mut dev), 0);
    assert_eq!(dev.log, vec!["create 1", "release 1"]);
}

#[test]
fn decode_completing_after_clear_is_discarded() {
    let ops = TestOps {
        decodes: Arc::new(AtomicUsize::new(0)),
        delay: Duration::from_millis(50),
        fail_key: None,
    };
    let decodes = Arc::clone(&ops.decodes);
    let cache = UploadCache::new("test", ops);
    let mut dev = TestDevice::default();

    cache.load_async(&4);
    wait_for(|| decodes.load(Ordering::SeqCst) == 1);
    cache.clear();

    // Give the stale decode time to finish; its result must not surface.
    thread::sleep(Duration::from_millis(120));
    assert_eq!(cache.pending_len(), 0);
    assert!(cache.is_empty());

    // The key is free to queue again and completes normally.
    wait_for(|| {
        cache.load_async(&4);
        cache.pending_len() == 1
    });
    assert_eq!(cache.upload(1, &mut dev), 1);
    assert_eq!(cache.get_or_none(&4), Some((1, 8)));
    assert_eq!(decodes.load(Ordering::SeqCst), 2);
}

#[test]
fn failed_decode_clears_marker_for_retry() {
    let ops = TestOps {
        decodes: Arc::new(AtomicUsize::new(0)),
        delay: Duration::ZERO,
        fail_key: Some(3),
    };
    let decodes = Arc::clone(&ops.decodes);
    let cache = UploadCache::new("test", ops);

    cache.load_async(&3);
    wait_for(|| decodes.load(Ordering::SeqCst) >= 1);

    // The marker must be gone or this retry would be swallowed.
    wait_for(|| {
        cache.load_async(&3);
        decodes.load(Ordering::SeqCst) >= 2
    });
    assert_eq!(cache.pending_len(), 0);
    assert!(cache.is_empty());
}

#[test]
fn insert_precomputed_ignores_duplicates() {
    let cache = UploadCache::new("test", TestOps::plain());
    let mut dev = TestDevice::default();
    cache.insert_precomputed(5, 10);
    cache.insert_precomputed(5, 999);
    assert_eq!(cache.pending_len(), 1);

    assert_eq!(cache.upload(2, &mut dev), 1);
    assert_eq!(cache.get_or_none(&5), Some((1, 10)));
}

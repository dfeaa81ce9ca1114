// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory unlock keys with single-shot relock timers.
//!
//! A key exists in this cache only while its collection (or standalone
//! secret) is unlocked; eviction implies the target is logically locked
//! again. For `CustomLockTimeoutRelock` targets a single-shot timer evicts
//! the key when it fires. Repeated accesses within the window do not reset
//! the timer: a new timer is armed only when none is pending for the name.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Default)]
struct Shelf {
    keys: Mutex<HashMap<String, Zeroizing<Vec<u8>>>>,
    pending_timers: Mutex<HashSet<String>>,
}

impl Shelf {
    fn get(&self, name: &str) -> Option<Zeroizing<Vec<u8>>> {
        self.keys.lock().get(name).cloned()
    }

    fn contains(&self, name: &str) -> bool {
        self.keys.lock().contains_key(name)
    }

    fn insert(&self, name: &str, key: Zeroizing<Vec<u8>>) {
        self.keys.lock().insert(name.to_string(), key);
    }

    fn remove(&self, name: &str) -> bool {
        self.keys.lock().remove(name).is_some()
    }

    /// Returns true if no timer was pending and one should be armed.
    fn arm(&self, name: &str) -> bool {
        self.pending_timers.lock().insert(name.to_string())
    }

    fn disarm(&self, name: &str) {
        self.pending_timers.lock().remove(name);
    }
}

/// Unlock keys for collections (by name) and standalone secrets (by hashed
/// secret name).
#[derive(Default)]
pub struct KeyCache {
    collections: Shelf,
    standalone: Shelf,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- collection keys ----

    pub fn collection_key(&self, collection_name: &str) -> Option<Zeroizing<Vec<u8>>> {
        self.collections.get(collection_name)
    }

    pub fn contains_collection(&self, collection_name: &str) -> bool {
        self.collections.contains(collection_name)
    }

    pub fn insert_collection_key(&self, collection_name: &str, key: Zeroizing<Vec<u8>>) {
        self.collections.insert(collection_name, key);
    }

    pub fn remove_collection_key(&self, collection_name: &str) {
        self.collections.remove(collection_name);
    }

    /// Arm the single-shot relock timer for a collection, unless one is
    /// already pending.
    pub fn arm_collection_relock(self: &Arc<Self>, collection_name: &str, timeout_ms: u64) {
        if !self.collections.arm(collection_name) {
            return;
        }
        let cache = Arc::clone(self);
        let name = collection_name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            cache.collections.disarm(&name);
            if cache.collections.remove(&name) {
                debug!(collection = %name, "relocking collection after unlock timeout");
            }
        });
    }

    // ---- standalone secret keys ----

    pub fn standalone_key(&self, hashed_secret_name: &str) -> Option<Zeroizing<Vec<u8>>> {
        self.standalone.get(hashed_secret_name)
    }

    pub fn insert_standalone_key(&self, hashed_secret_name: &str, key: Zeroizing<Vec<u8>>) {
        self.standalone.insert(hashed_secret_name, key);
    }

    pub fn remove_standalone_key(&self, hashed_secret_name: &str) {
        self.standalone.remove(hashed_secret_name);
    }

    /// Arm the single-shot relock timer for a standalone secret, unless one
    /// is already pending.
    pub fn arm_standalone_relock(self: &Arc<Self>, hashed_secret_name: &str, timeout_ms: u64) {
        if !self.standalone.arm(hashed_secret_name) {
            return;
        }
        let cache = Arc::clone(self);
        let name = hashed_secret_name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            cache.standalone.disarm(&name);
            if cache.standalone.remove(&name) {
                debug!(secret = %name, "relocking standalone secret after unlock timeout");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(vec![byte; 32])
    }

    #[test]
    fn test_insert_get_remove() {
        let cache = KeyCache::new();
        assert!(cache.collection_key("wallet").is_none());

        cache.insert_collection_key("wallet", key(1));
        assert_eq!(cache.collection_key("wallet").unwrap().as_slice(), &[1u8; 32]);
        assert!(cache.contains_collection("wallet"));

        cache.remove_collection_key("wallet");
        assert!(cache.collection_key("wallet").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relock_timer_evicts_key() {
        let cache = Arc::new(KeyCache::new());
        cache.insert_collection_key("wallet", key(1));
        cache.arm_collection_relock("wallet", 500);

        tokio::time::sleep(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;
        assert!(cache.contains_collection("wallet"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert!(!cache.contains_collection("wallet"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_access_does_not_reset_timer() {
        let cache = Arc::new(KeyCache::new());
        cache.insert_collection_key("wallet", key(1));
        cache.arm_collection_relock("wallet", 500);

        // A second arm inside the window must not extend the deadline.
        tokio::time::sleep(Duration::from_millis(400)).await;
        cache.arm_collection_relock("wallet", 500);

        tokio::time::sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert!(!cache.contains_collection("wallet"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_can_rearm_after_fire() {
        let cache = Arc::new(KeyCache::new());
        cache.insert_collection_key("wallet", key(1));
        cache.arm_collection_relock("wallet", 100);

        tokio::time::sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert!(!cache.contains_collection("wallet"));

        // A fresh unlock caches a key and arms a fresh timer.
        cache.insert_collection_key("wallet", key(2));
        cache.arm_collection_relock("wallet", 100);
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        assert!(cache.contains_collection("wallet"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert!(!cache.contains_collection("wallet"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_standalone_timer_is_independent() {
        let cache = Arc::new(KeyCache::new());
        cache.insert_standalone_key("h1", key(1));
        cache.insert_collection_key("wallet", key(2));
        cache.arm_standalone_relock("h1", 100);

        tokio::time::sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert!(cache.standalone_key("h1").is_none());
        assert!(cache.contains_collection("wallet"));
    }
}

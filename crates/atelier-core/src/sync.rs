//! Per-key asynchronous mutual exclusion.
//!
//! A registry mapping arbitrary string keys to async mutexes, created on
//! first use. The model manager takes one lock per model id so at most one
//! load-or-unload is in flight per model; the filesystem stores take one per
//! record so concurrent read-modify-write cycles cannot lose updates.
//! Unrelated keys proceed fully in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of named async locks.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `key`, creating it on first use.
    ///
    /// The returned guard releases the lock on drop. The internal map lock is
    /// only held while looking up the entry, never across the await.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("keyed lock registry poisoned");
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of keys seen so far. Locks are kept for the registry's
    /// lifetime; keys are bounded by the set of live record ids.
    pub fn len(&self) -> usize {
        self.locks.lock().expect("keyed lock registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_same_key_is_mutually_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let concurrent = concurrent.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("model-a").await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block_each_other() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire("model-a").await;
        // Must not deadlock while "model-a" is held.
        let _b = locks.acquire("model-b").await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_lock_is_reusable_after_release() {
        let locks = KeyedLocks::new();
        drop(locks.acquire("k").await);
        drop(locks.acquire("k").await);
        assert_eq!(locks.len(), 1);
    }
}

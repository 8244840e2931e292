//! LRU cache with coalesced loads.
//!
//! Each entry is a shared cell. The first caller for a missing key
//! initializes it while later callers wait on the same cell, so a key is
//! decoded at most once while cached. A failed or cancelled load leaves
//! the cell empty for the next caller to retry.

use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{Mutex, OnceCell};

type Slot<V> = Arc<OnceCell<Arc<V>>>;

pub struct CoalescingLru<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, Slot<V>>>,
}

impl<K, V> CoalescingLru<K, V>
where
    K: Hash + Eq + Clone,
{
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the cached value for `key`, running `init` if there is none.
    /// Accessing a key marks it most recently used.
    ///
    /// # Errors
    ///
    /// Returns the error of `init`. Failed loads are not cached.
    pub async fn get_or_try_init<E, F, Fut>(&self, key: &K, init: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = {
            let mut entries = self.entries.lock().await;
            if let Some(slot) = entries.get(key) {
                slot.clone()
            } else {
                let slot: Slot<V> = Arc::new(OnceCell::new());
                entries.put(key.clone(), slot.clone());
                slot
            }
        };

        match slot.get_or_try_init(|| async { init().await.map(Arc::new) }).await {
            Ok(value) => Ok(value.clone()),
            Err(e) => {
                let mut entries = self.entries.lock().await;
                if entries.peek(key).is_some_and(|cached| Arc::ptr_eq(cached, &slot)) {
                    entries.pop(key);
                }
                Err(e)
            }
        }
    }

    /// Whether `key` is cached, without touching its recency.
    #[cfg(test)]
    pub async fn contains(&self, key: &K) -> bool {
        self.entries.lock().await.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_misses_share_one_load() {
        let cache: Arc<CoalescingLru<&str, u32>> = Arc::new(CoalescingLru::new(4));
        let loads = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let loads = loads.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_try_init(&"on", || async {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, ()>(7)
                    })
                    .await
            }));
        }
        for task in tasks {
            assert_eq!(*task.await.unwrap().unwrap(), 7);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let cache: CoalescingLru<u32, u32> = CoalescingLru::new(2);
        for key in [1, 2] {
            cache.get_or_try_init(&key, || async move { Ok::<_, ()>(key) }).await.unwrap();
        }
        cache.get_or_try_init(&1, || async { Ok::<_, ()>(0) }).await.unwrap();
        cache.get_or_try_init(&3, || async { Ok::<_, ()>(3) }).await.unwrap();

        assert!(cache.contains(&1).await);
        assert!(!cache.contains(&2).await);
        assert!(cache.contains(&3).await);
    }

    #[tokio::test]
    async fn failed_loads_are_retried() {
        let cache: CoalescingLru<u32, u32> = CoalescingLru::new(2);
        let err = cache.get_or_try_init(&1, || async { Err::<u32, _>("boom") }).await;
        assert_eq!(err.unwrap_err(), "boom");
        assert!(!cache.contains(&1).await);

        let value = cache.get_or_try_init(&1, || async { Ok::<_, &str>(5) }).await.unwrap();
        assert_eq!(*value, 5);
    }
}

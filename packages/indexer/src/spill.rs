//! A bounded in-memory cache that spills evicted entries to disk.
//!
//! Evicted values are encoded with MessagePack and written by a background
//! task. A later access to the same key first awaits that write, then
//! reads the file back.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use lru::LruCache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::IndexerError;

/// Spill writes allowed in flight before new evictions wait for them.
const MAX_PENDING_WRITES: usize = 32;

pub struct SpillCache<K: Hash + Eq, V> {
    dir: PathBuf,
    entries: LruCache<K, V>,
    ids: HashMap<K, u64>,
    pending: HashMap<u64, JoinHandle<std::io::Result<()>>>,
    spills: u64,
}

impl<K, V> SpillCache<K, V>
where
    K: Hash + Eq,
    V: Default + Serialize + DeserializeOwned,
{
    /// Creates the cache; spill files go into `dir`, which must exist.
    #[must_use]
    pub fn new(dir: PathBuf, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            dir,
            entries: LruCache::new(capacity),
            ids: HashMap::new(),
            pending: HashMap::new(),
            spills: 0,
        }
    }

    /// Number of evictions so far.
    #[must_use]
    pub const fn spills(&self) -> u64 {
        self.spills
    }

    fn path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{id}.msgpack"))
    }

    /// Applies `f` to the value for `key`, loading it from disk or starting
    /// from the default value.
    ///
    /// # Errors
    ///
    /// Returns an error if spilling or reloading fails.
    pub async fn update(&mut self, key: K, f: impl FnOnce(&mut V)) -> Result<(), IndexerError> {
        let mut value = match self.entries.pop(&key) {
            Some(value) => value,
            None => self.load(&key).await?.unwrap_or_default(),
        };
        f(&mut value);

        if let Some((evicted_key, evicted)) = self.entries.push(key, value) {
            self.spill(evicted_key, evicted).await?;
        }
        Ok(())
    }

    /// Removes and returns the value for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if reloading a spilled value fails.
    pub async fn take(&mut self, key: &K) -> Result<Option<V>, IndexerError> {
        if let Some(value) = self.entries.pop(key) {
            return Ok(Some(value));
        }
        self.load(key).await
    }

    async fn load(&mut self, key: &K) -> Result<Option<V>, IndexerError> {
        let Some(&id) = self.ids.get(key) else {
            return Ok(None);
        };
        if let Some(write) = self.pending.remove(&id) {
            write.await??;
        }

        let path = self.path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        tokio::fs::remove_file(&path).await?;

        Ok(Some(rmp_serde::from_slice(&bytes)?))
    }

    async fn spill(&mut self, key: K, value: V) -> Result<(), IndexerError> {
        if self.pending.len() >= MAX_PENDING_WRITES {
            self.wait_for_writes().await?;
        }

        let next = self.ids.len() as u64;
        let id = *self.ids.entry(key).or_insert(next);
        let bytes = rmp_serde::to_vec_named(&value)?;
        let path = self.path(id);

        self.pending.insert(id, tokio::spawn(tokio::fs::write(path, bytes)));
        self.spills += 1;
        Ok(())
    }

    /// Waits for every background write.
    ///
    /// # Errors
    ///
    /// Returns the first write failure.
    pub async fn wait_for_writes(&mut self) -> Result<(), IndexerError> {
        let writes = self.pending.drain().map(|(_, write)| write);
        for result in futures::future::try_join_all(writes).await? {
            result?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spills_and_reloads_evicted_entries() {
        let dir = std::env::temp_dir().join("street_index_spill_cache");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let mut cache: SpillCache<String, Vec<u32>> = SpillCache::new(dir.clone(), 2);
        for round in 0..3 {
            for key in ["a", "b", "c", "d", "e"] {
                cache.update(key.to_string(), |v| v.push(round)).await.unwrap();
            }
        }
        assert!(cache.spills() > 0);

        for key in ["a", "b", "c", "d", "e"] {
            let values = cache.take(&key.to_string()).await.unwrap().unwrap();
            assert_eq!(values, vec![0, 1, 2], "{key}");
        }
        assert!(cache.take(&"a".to_string()).await.unwrap().is_none());
        assert!(cache.take(&"z".to_string()).await.unwrap().is_none());

        cache.wait_for_writes().await.unwrap();
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }
}

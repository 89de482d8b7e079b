//! # In-Memory Store
//!
//! Single-process `KeyValueStore` backed by `DashMap`. Expiry is checked on
//! access and `TTL` replies follow Redis semantics, so the engine behaves the
//! same against this store as against Redis. Stores built with
//! [`InMemoryStore::with_cleanup_interval`] also sweep expired entries on a
//! timer, so keys that are never read again still free their memory.

use super::{KeyValueStore, TTL_KEY_MISSING, TTL_NO_EXPIRY};
use crate::core::error::CacheResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// In-memory store implementation
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
    writes: AtomicU64,
    cleanup_task: Option<JoinHandle<()>>,
}

impl InMemoryStore {
    /// Create a store that only drops expired entries when they are read
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that also sweeps expired entries every `cleanup_interval`.
    ///
    /// Must be called inside a tokio runtime. The sweep stops when the store
    /// is dropped.
    pub fn with_cleanup_interval(cleanup_interval: Duration) -> Self {
        let entries: Arc<DashMap<String, StoredValue>> = Arc::new(DashMap::new());

        let cleanup_task = {
            let entries = entries.clone();
            tokio::spawn(async move {
                let mut interval = interval(cleanup_interval);
                loop {
                    interval.tick().await;
                    Self::remove_expired(&entries);
                }
            })
        };

        Self {
            entries,
            writes: AtomicU64::new(0),
            cleanup_task: Some(cleanup_task),
        }
    }

    /// Store a value without expiry (`SET` rather than `SETEX`)
    pub fn set_persistent(&self, key: &str, value: &[u8]) {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                bytes: value.to_vec(),
                expires_at: None,
            },
        );
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.value().is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of `SETEX` calls served
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Entries held in memory, including expired ones not yet swept
    pub fn stored_entries(&self) -> usize {
        self.entries.len()
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        Self::remove_expired(&self.entries)
    }

    fn remove_expired(entries: &DashMap<String, StoredValue>) -> usize {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, v| !v.is_expired(now));
        let removed = before.saturating_sub(entries.len());
        if removed > 0 {
            debug!("Purged {} expired in-memory entries", removed);
        }
        removed
    }

    fn live(&self, key: &str) -> Option<StoredValue> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove_if(key, |_, v| v.is_expired(now));
            return None;
        }
        Some(entry.value().clone())
    }
}

impl Drop for InMemoryStore {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.live(key).map(|v| v.bytes))
    }

    async fn set_with_expiry(&self, key: &str, value: &[u8], ttl_seconds: u64) -> CacheResult<()> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
        self.entries.insert(
            key.to_string(),
            StoredValue {
                bytes: value.to_vec(),
                expires_at: Some(expires_at),
            },
        );
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> CacheResult<i64> {
        let Some(value) = self.live(key) else {
            return Ok(TTL_KEY_MISSING);
        };
        Ok(match value.expires_at {
            // Redis rounds TTL to the nearest second
            Some(at) => {
                let remaining = at.saturating_duration_since(Instant::now());
                ((remaining.as_millis() + 500) / 1000) as i64
            }
            None => TTL_NO_EXPIRY,
        })
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_basic_operations() {
        let store = InMemoryStore::new();

        store.set_with_expiry("foo", b"\"bar\"", 60).await.unwrap();
        assert_eq!(store.get("foo").await.unwrap(), Some(b"\"bar\"".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_ttl_sentinels() {
        let store = InMemoryStore::new();
        store.set_with_expiry("expiring", b"1", 100).await.unwrap();
        store.set_persistent("forever", b"1");

        assert_eq!(store.ttl("expiring").await.unwrap(), 100);
        assert_eq!(store.ttl("forever").await.unwrap(), TTL_NO_EXPIRY);
        assert_eq!(store.ttl("missing").await.unwrap(), TTL_KEY_MISSING);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let store = InMemoryStore::new();
        store.set_with_expiry("short", b"1", 0).await.unwrap();

        sleep(Duration::from_millis(10)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.ttl("short").await.unwrap(), TTL_KEY_MISSING);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_resets_expiry() {
        let store = InMemoryStore::new();
        store.set_with_expiry("key", b"old", 10).await.unwrap();
        store.set_with_expiry("key", b"new", 500).await.unwrap();

        assert_eq!(store.get("key").await.unwrap(), Some(b"new".to_vec()));
        assert_eq!(store.ttl("key").await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryStore::new();
        store.set_with_expiry("gone", b"1", 0).await.unwrap();
        store.set_with_expiry("kept", b"1", 60).await.unwrap();

        sleep(Duration::from_millis(10)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_kept_until_read_without_cleanup() {
        let store = InMemoryStore::new();
        store.set_with_expiry("gone", b"1", 0).await.unwrap();

        sleep(Duration::from_millis(10)).await;

        assert_eq!(store.len(), 0);
        assert_eq!(store.stored_entries(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_task_frees_unread_expired_entries() {
        let store = InMemoryStore::with_cleanup_interval(Duration::from_millis(10));
        for i in 0..1000 {
            store
                .set_with_expiry(&format!("key:{}", i), b"1", 0)
                .await
                .unwrap();
        }
        store.set_with_expiry("kept", b"1", 60).await.unwrap();

        let mut swept = false;
        for _ in 0..50 {
            sleep(Duration::from_millis(10)).await;
            if store.stored_entries() == 1 {
                swept = true;
                break;
            }
        }

        assert!(swept, "{} entries still stored", store.stored_entries());
        assert_eq!(store.get("kept").await.unwrap(), Some(b"1".to_vec()));
    }
}

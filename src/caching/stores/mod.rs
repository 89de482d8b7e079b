//! # Cache Stores Module
//!
//! The minimal command surface the engine needs from a TTL-capable key-value
//! store (`GET`, `SETEX`, `TTL`, `PING`), plus the adapter that turns a failed
//! `PING` into "store is down".

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};

use crate::core::error::CacheResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// `TTL` reply for a key that does not exist
pub const TTL_KEY_MISSING: i64 = -2;

/// `TTL` reply for a key that exists without an expiry
pub const TTL_NO_EXPIRY: i64 = -1;

/// Trait for backing store implementations
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the raw bytes stored under `key`
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, expiring after `ttl_seconds`
    async fn set_with_expiry(&self, key: &str, value: &[u8], ttl_seconds: u64) -> CacheResult<()>;

    /// Remaining lifetime of `key` in seconds.
    ///
    /// Returns [`TTL_KEY_MISSING`] or [`TTL_NO_EXPIRY`] following Redis semantics.
    async fn ttl(&self, key: &str) -> CacheResult<i64>;

    /// Liveness probe
    async fn ping(&self) -> CacheResult<()>;
}

/// Thin wrapper the engine talks to.
///
/// Every operation is forwarded to the underlying store unchanged, except the
/// availability probe, which is the one place store errors are absorbed.
#[derive(Clone)]
pub struct StoreAdapter {
    store: Arc<dyn KeyValueStore>,
}

impl StoreAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Check whether the store answers `PING`.
    pub async fn is_available(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) if e.is_connectivity() => {
                warn!(error = %e, "Cache store is down, passing through to computation");
                false
            }
            Err(e) => {
                warn!(error = %e, error_type = e.error_type(), "Cache store ping failed");
                false
            }
        }
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.store.get(key).await
    }

    pub async fn set_with_expiry(&self, key: &str, value: &[u8], ttl_seconds: u64) -> CacheResult<()> {
        debug!(key, ttl_seconds, bytes = value.len(), "SETEX");
        self.store.set_with_expiry(key, value, ttl_seconds).await
    }

    pub async fn ttl(&self, key: &str) -> CacheResult<i64> {
        self.store.ttl(key).await
    }
}

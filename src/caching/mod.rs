//! # Caching Module
//!
//! The cache-aside engine and the pieces it is assembled from.
//!
//! ## Architecture
//! 1. **Cache Manager**: [`Redcache`], the read/compute/write/refresh protocol
//! 2. **Envelope**: JSON encoding, optionally wrapped by the encryption service
//! 3. **Encryption**: authenticated token scheme keyed by the configured secret
//! 4. **Refresh**: per-key tracking of background refreshes
//! 5. **Stores**: the key-value store capability, with Redis and in-memory backends
//!
//! ## Usage Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use redcache::{CacheConfig, InMemoryStore, Redcache};
//!
//! let cache = Redcache::new(CacheConfig::default(), Arc::new(InMemoryStore::new()))?;
//! let total: anyhow::Result<u64> = cache.cache("orders:total", || async { Ok(42) }).await;
//! ```

pub mod cache_manager;
pub mod encryption;
pub mod envelope;
pub mod refresh;
pub mod stores;

pub use cache_manager::{CacheLookup, Redcache};
pub use encryption::{EncryptionService, TokenCipher};
pub use envelope::EnvelopeCodec;
pub use refresh::{RefreshGuard, RefreshRegistry};
pub use stores::{InMemoryStore, KeyValueStore, RedisStore, RedisStoreConfig, StoreAdapter};

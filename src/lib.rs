//! # Redcache - Cache-Aside Library Crate
//!
//! A cache-aside layer over a TTL-capable key-value store (Redis in production).
//! Callers hand [`Redcache::cache`] a key and the computation that produces the
//! value; the engine serves a fresh cached value, computes and stores on a miss,
//! and refreshes in the background once an entry is close to expiry
//! (stale-while-revalidate).
//!
//! ## Behaviour Summary
//! - Every write uses the same ttl, so "remaining lifetime" tells the engine how
//!   old an entry is
//! - An unreachable store is never an error: the computation just runs directly
//! - Values are stored as JSON, optionally sealed with authenticated encryption
//! - Events (`<prefix>.cache.hit`, `.miss`, `.write`, `.stale_refresh`,
//!   `.refresh_failed`) go to a pluggable [`EventEmitter`]
//!
//! ## Usage Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use redcache::{Redcache, RedisStore, RedisStoreConfig, TracingEmitter};
//!
//! let store = Arc::new(RedisStore::new(RedisStoreConfig::default())?);
//! let cache = Redcache::configure(|c| {
//!     c.store = Some(store);
//!     c.emitter = Some(Arc::new(TracingEmitter));
//! })?;
//!
//! let profile: anyhow::Result<Profile> = cache
//!     .cache("user:123:profile", || async { load_profile(123).await })
//!     .await;
//! ```

/// Error types and configuration
pub mod core;

/// The cache engine, its value codec, background refresh tracking and the
/// backing store implementations
pub mod caching;

/// Logging setup and cache event sinks
pub mod observability;

pub use caching::{
    CacheLookup, EncryptionService, EnvelopeCodec, InMemoryStore, KeyValueStore, Redcache,
    RedisStore, RedisStoreConfig, RefreshRegistry, StoreAdapter, TokenCipher,
};
pub use crate::core::{CacheConfig, CacheResult, Configuration, RedcacheConfig, RedcacheError};
pub use observability::{
    init_logging, CacheEvent, CompositeEmitter, EventEmitter, EventFields, LogConfig, LogFormat,
    MetricsEmitter, NoopEmitter, RecordingEmitter, TracingEmitter,
};

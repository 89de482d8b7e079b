//! # Cache Engine
//!
//! [`Redcache`] runs the cache-aside protocol: serve a cached value when it is
//! fresh, recompute and store it when it is absent, and recompute it in the
//! background when it is still valid but close to expiry.
//!
//! ```text
//! cache(key, computation)
//!   skip_cache?            -> computation
//!   store unavailable?     -> computation
//!   GET + decode
//!     miss                 -> computation, SETEX, return computed
//!     hit, fresh           -> return cached
//!     hit, stale           -> spawn(computation, SETEX), return cached
//! ```

use super::encryption::EncryptionService;
use super::envelope::EnvelopeCodec;
use super::refresh::RefreshRegistry;
use super::stores::{KeyValueStore, StoreAdapter};
use crate::core::config::{CacheConfig, Configuration};
use crate::core::error::{CacheResult, RedcacheError};
use crate::observability::events::{CacheEvent, EventEmitter, EventFields};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of reading a key from the store
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    /// Present with more than `ttl - stale_threshold` left
    Fresh(T),
    /// Present but due for a background refresh
    Stale(T),
    /// No entry, or an entry that could not be decoded
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }
}

struct Inner {
    config: CacheConfig,
    store: StoreAdapter,
    codec: EnvelopeCodec,
    emitter: Option<Arc<dyn EventEmitter>>,
    refreshes: RefreshRegistry,
}

/// The cache engine. Cheap to clone; clones share configuration and store.
#[derive(Clone)]
pub struct Redcache {
    inner: Arc<Inner>,
}

impl Redcache {
    /// Build an engine from a setup callback.
    ///
    /// ```rust,ignore
    /// let store = Arc::new(RedisStore::new(RedisStoreConfig::default())?);
    /// let cache = Redcache::configure(|c| {
    ///     c.store = Some(store);
    ///     c.emitter = Some(Arc::new(TracingEmitter));
    ///     c.cache.stale_threshold = Duration::from_secs(600);
    /// })?;
    /// ```
    pub fn configure<F>(setup: F) -> CacheResult<Self>
    where
        F: FnOnce(&mut Configuration),
    {
        let mut configuration = Configuration::default();
        setup(&mut configuration);
        Self::from_configuration(configuration)
    }

    /// Build an engine with the default encryption service and no event sink
    pub fn new(config: CacheConfig, store: Arc<dyn KeyValueStore>) -> CacheResult<Self> {
        let mut configuration = Configuration::new(config);
        configuration.store = Some(store);
        Self::from_configuration(configuration)
    }

    pub fn from_configuration(configuration: Configuration) -> CacheResult<Self> {
        let Configuration {
            cache: config,
            store,
            emitter,
            cipher,
        } = configuration;

        config.validate()?;
        let store = store.ok_or_else(|| RedcacheError::config("no backing store configured"))?;

        let codec = Self::build_codec(&config, cipher);

        info!(
            ttl = ?config.ttl,
            stale_threshold = ?config.stale_threshold,
            encrypt = config.encrypt,
            skip_cache = config.skip_cache,
            "Redcache configured"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store: StoreAdapter::new(store),
                codec,
                emitter,
                refreshes: RefreshRegistry::new(),
            }),
        })
    }

    fn build_codec(config: &CacheConfig, cipher: Arc<dyn EncryptionService>) -> EnvelopeCodec {
        EnvelopeCodec::new(config.encrypt, config.secret.as_deref(), cipher)
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// Computation errors on the synchronous path are returned unchanged. Store
    /// failures other than an unreachable store are converted into `E`.
    pub async fn cache<T, E, F, Fut>(&self, key: &str, computation: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: From<RedcacheError> + Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if self.skip_cache() || !self.inner.store.is_available().await {
            return computation().await;
        }

        match self.read_from_cache::<T>(key).await? {
            CacheLookup::Fresh(value) => Ok(value),
            CacheLookup::Stale(value) => {
                self.refresh_cache(key, computation);
                Ok(value)
            }
            CacheLookup::Miss => {
                let value = computation().await?;
                match self.inner.codec.encode(&value) {
                    Ok(bytes) => {
                        self.write_encoded(key, bytes).await?;
                    }
                    Err(e) => warn!(key, error = %e, "computed value cannot be encoded, not caching it"),
                }
                Ok(value)
            }
        }
    }

    /// Fetch and decode `key`, emitting `cache.hit` or `cache.miss`.
    ///
    /// Staleness is only checked when a value is present.
    pub async fn read_from_cache<T: DeserializeOwned>(&self, key: &str) -> CacheResult<CacheLookup<T>> {
        let Some(value) = self.get_value::<T>(key).await? else {
            self.emit(CacheEvent::Miss, key, None);
            debug!(key, "cache miss");
            return Ok(CacheLookup::Miss);
        };

        self.emit(CacheEvent::Hit, key, None);
        if self.key_stale(key).await? {
            debug!(key, "cache hit, stale");
            Ok(CacheLookup::Stale(value))
        } else {
            debug!(key, "cache hit");
            Ok(CacheLookup::Fresh(value))
        }
    }

    /// Store `value` under `key` unless the store has gone away since the
    /// availability check. Returns whether a write was issued.
    pub async fn write_into_cache<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<bool> {
        let bytes = self.inner.codec.encode(value)?;
        self.write_encoded(key, bytes).await
    }

    // Takes encoded bytes so callers holding a `T` across awaits don't need `T: Sync`.
    async fn write_encoded(&self, key: &str, bytes: Vec<u8>) -> CacheResult<bool> {
        if !self.inner.store.is_available().await {
            debug!(key, "store unavailable, skipping cache write");
            return Ok(false);
        }

        self.emit(CacheEvent::Write, key, None);
        self.inner
            .store
            .set_with_expiry(key, &bytes, self.inner.config.ttl.as_secs())
            .await?;
        Ok(true)
    }

    /// Recompute `key` in the background.
    ///
    /// Returns `None` without emitting anything when single-flight is on and a
    /// refresh for `key` is already running.
    pub fn refresh_cache<T, E, F, Fut>(&self, key: &str, computation: F) -> Option<JoinHandle<()>>
    where
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let guard = if self.inner.config.single_flight_refresh {
            match self.inner.refreshes.try_claim(key) {
                Some(guard) => Some(guard),
                None => {
                    debug!(key, "refresh already in flight, not starting another");
                    return None;
                }
            }
        } else {
            None
        };

        self.emit(CacheEvent::StaleRefresh, key, None);

        let engine = self.clone();
        let key = key.to_string();
        Some(tokio::spawn(async move {
            let _guard = guard;

            // Run the computation in its own task so a panic is reported here
            // instead of silently ending the refresh.
            let computed = match tokio::spawn(async move { computation().await }).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(e.to_string()),
                Err(join_error) => Err(format!("computation panicked: {}", join_error)),
            };

            let outcome = match computed.and_then(|value| {
                engine.inner.codec.encode(&value).map_err(|e| e.to_string())
            }) {
                Ok(bytes) => engine
                    .write_encoded(&key, bytes)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                Err(reason) => Err(reason),
            };

            match outcome {
                Ok(()) => debug!(key = %key, "background refresh complete"),
                Err(reason) => {
                    error!(key = %key, error = %reason, "background refresh failed");
                    engine.emit(CacheEvent::RefreshFailed, &key, Some(reason));
                }
            }
        }))
    }

    /// Fetch and decode `key`; undecodable records read as `None`
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let raw = self.inner.store.get(key).await?;
        Ok(self.inner.codec.decode(raw.as_deref()))
    }

    /// Encode `value` and `SETEX` it with the configured ttl
    pub async fn set_value<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<()> {
        let bytes = self.inner.codec.encode(value)?;
        self.inner
            .store
            .set_with_expiry(key, &bytes, self.inner.config.ttl.as_secs())
            .await
    }

    /// Whether `key` has less than `ttl - stale_threshold` seconds left.
    ///
    /// Compares remaining lifetime as reported by the store, so records written
    /// under an older ttl setting are judged by what they actually have left.
    pub async fn key_stale(&self, key: &str) -> CacheResult<bool> {
        let remaining = self.inner.store.ttl(key).await?;
        Ok(remaining < self.inner.config.stale_cutoff())
    }

    fn emit(&self, event: CacheEvent, key: &str, error: Option<String>) {
        if self.inner.config.silent {
            return;
        }
        let Some(emitter) = &self.inner.emitter else {
            return;
        };

        let mut fields = EventFields::new();
        fields.insert("key".to_string(), Value::from(key));
        if let Some(error) = error {
            fields.insert("error".to_string(), Value::from(error));
        }
        emitter.emit(&event.qualified(&self.inner.config.event_prefix), &fields);
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn ttl(&self) -> Duration {
        self.inner.config.ttl
    }

    pub fn stale_threshold(&self) -> Duration {
        self.inner.config.stale_threshold
    }

    pub fn skip_cache(&self) -> bool {
        self.inner.config.skip_cache
    }

    pub fn secret(&self) -> Option<&str> {
        self.inner.config.secret.as_deref()
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.inner.codec
    }

    pub fn store(&self) -> &StoreAdapter {
        &self.inner.store
    }

    /// Number of background refreshes currently tracked
    pub fn refreshes_in_flight(&self) -> usize {
        self.inner.refreshes.in_flight()
    }
}

impl std::fmt::Debug for Redcache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redcache")
            .field("config", &self.inner.config)
            .field("codec", &self.inner.codec)
            .field("has_emitter", &self.inner.emitter.is_some())
            .finish_non_exhaustive()
    }
}

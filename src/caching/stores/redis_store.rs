//! # Redis Store
//!
//! `KeyValueStore` over Redis using a lazily established `ConnectionManager`.
//! The connection is opened on first use rather than at construction so a
//! store can be built while Redis is down; the engine then sees a failed
//! `PING` and passes through to the computation until Redis comes back.
//!
//! Only one connect attempt runs at a time. Callers arriving while it runs
//! wait for its outcome instead of starting their own, and after a failed
//! attempt every call fails fast for `reconnect_backoff`.

use super::KeyValueStore;
use crate::core::error::{CacheResult, RedcacheError};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError, RedisResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, error, info, warn};

/// Redis store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisStoreConfig {
    /// Redis connection URL
    pub url: String,

    /// Timeout for establishing a connection
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,

    /// Timeout for a single command round trip
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Namespace prepended to every key (empty by default)
    pub key_prefix: String,

    /// Maximum number of retries for GET/SETEX/TTL on connection errors
    pub max_retries: u32,

    /// Base retry delay, multiplied by the attempt number
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// How long calls fail fast after a failed connect attempt
    #[serde(with = "humantime_serde")]
    pub reconnect_backoff: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout: Duration::from_secs(2),
            operation_timeout: Duration::from_secs(2),
            key_prefix: String::new(),
            max_retries: 2,
            retry_delay: Duration::from_millis(100),
            reconnect_backoff: Duration::from_secs(1),
        }
    }
}

/// Counters kept by the Redis store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisStoreStats {
    pub hits: u64,
    pub misses: u64,
    pub connection_errors: u64,
    pub timeouts: u64,
}

/// Redis store implementation
pub struct RedisStore {
    config: RedisStoreConfig,
    client: Client,
    connection: RwLock<Option<ConnectionManager>>,
    connecting: AsyncMutex<()>,
    last_connect_failure: Mutex<Option<Instant>>,
    hits: AtomicU64,
    misses: AtomicU64,
    connection_errors: AtomicU64,
    timeouts: AtomicU64,
}

impl RedisStore {
    /// Create a new Redis store. Only the URL is validated here.
    pub fn new(config: RedisStoreConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            config,
            client,
            connection: RwLock::new(None),
            connecting: AsyncMutex::new(()),
            last_connect_failure: Mutex::new(None),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    pub fn stats(&self) -> RedisStoreStats {
        RedisStoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Get the full key with namespace prefix
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn timeout_error(&self, timeout: Duration) -> RedcacheError {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        RedcacheError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    async fn current_connection(&self) -> Option<ConnectionManager> {
        self.connection.read().await.clone()
    }

    /// Error if a connect attempt failed less than `reconnect_backoff` ago
    fn check_backoff(&self) -> CacheResult<()> {
        let last_failure = match self.last_connect_failure.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        match last_failure {
            Some(at) if at.elapsed() < self.config.reconnect_backoff => Err(
                RedcacheError::unavailable("Redis connect attempt failed recently, backing off"),
            ),
            _ => Ok(()),
        }
    }

    fn record_connect_failure(&self, failed: Option<Instant>) {
        match self.last_connect_failure.lock() {
            Ok(mut guard) => *guard = failed,
            Err(poisoned) => *poisoned.into_inner() = failed,
        }
    }

    /// Return the shared connection, establishing it on first use
    async fn connection(&self) -> CacheResult<ConnectionManager> {
        if let Some(conn) = self.current_connection().await {
            return Ok(conn);
        }
        self.check_backoff()?;

        let _connecting = self.connecting.lock().await;

        // Another caller may have finished an attempt while we waited.
        if let Some(conn) = self.current_connection().await {
            return Ok(conn);
        }
        self.check_backoff()?;

        let connect = ConnectionManager::new(self.client.clone());
        let conn = match tokio::time::timeout(self.config.connection_timeout, connect).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                self.connection_errors.fetch_add(1, Ordering::Relaxed);
                self.record_connect_failure(Some(Instant::now()));
                return Err(e.into());
            }
            Err(_) => {
                self.record_connect_failure(Some(Instant::now()));
                return Err(self.timeout_error(self.config.connection_timeout));
            }
        };

        info!("Redis store connected to {}", self.config.url);
        self.record_connect_failure(None);
        *self.connection.write().await = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the shared connection so the next call reconnects
    async fn reset_connection(&self) {
        let mut slot = self.connection.write().await;
        if slot.take().is_some() {
            debug!("Dropped Redis connection, will reconnect on next use");
        }
    }

    /// Execute a Redis operation with retry logic.
    ///
    /// Only connection-level failures are retried; command errors are returned
    /// as-is on the first attempt.
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> CacheResult<T>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let mut retries = 0;

        loop {
            let conn = self.connection().await?;
            let timeout = self.config.operation_timeout;

            let failure = match tokio::time::timeout(timeout, operation(conn)).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    error!("Redis operation failed: {}", e);
                    self.connection_errors.fetch_add(1, Ordering::Relaxed);
                    if !is_retryable(&e) || retries >= self.config.max_retries {
                        return Err(e.into());
                    }
                    RedcacheError::Redis(e)
                }
                Err(_) => {
                    let err = self.timeout_error(timeout);
                    if retries >= self.config.max_retries {
                        return Err(err);
                    }
                    err
                }
            };

            retries += 1;
            warn!("Retrying Redis operation (attempt {}): {}", retries, failure);
            self.reset_connection().await;
            tokio::time::sleep(self.config.retry_delay * retries).await;
        }
    }
}

fn is_retryable(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_timeout()
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let full_key = self.full_key(key);
        let k = full_key.as_str();

        let value = self
            .execute_with_retry(move |mut conn| async move {
                conn.get::<_, Option<Vec<u8>>>(k).await
            })
            .await?;

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn set_with_expiry(&self, key: &str, value: &[u8], ttl_seconds: u64) -> CacheResult<()> {
        let full_key = self.full_key(key);
        let k = full_key.as_str();

        self.execute_with_retry(move |mut conn| async move {
            redis::cmd("SETEX")
                .arg(k)
                .arg(ttl_seconds)
                .arg(value)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await?;

        debug!("Set Redis key: {} with TTL: {}s", key, ttl_seconds);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> CacheResult<i64> {
        let full_key = self.full_key(key);
        let k = full_key.as_str();

        self.execute_with_retry(move |mut conn| async move { conn.ttl::<_, i64>(k).await })
            .await
    }

    async fn ping(&self) -> CacheResult<()> {
        // Single attempt: a slow or failing PING means "down", not "retry".
        let mut conn = self.connection().await?;
        let timeout = self.config.operation_timeout;

        let cmd = redis::cmd("PING");
        let ping = cmd.query_async::<_, String>(&mut conn);
        match tokio::time::timeout(timeout, ping).await {
            Ok(Ok(reply)) if reply == "PONG" => Ok(()),
            Ok(Ok(reply)) => Err(RedcacheError::store(format!(
                "unexpected PING reply: {}",
                reply
            ))),
            Ok(Err(e)) => {
                self.connection_errors.fetch_add(1, Ordering::Relaxed);
                Err(e.into())
            }
            Err(_) => Err(self.timeout_error(timeout)),
        }
    }
}

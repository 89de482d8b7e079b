//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use redcache::{
    CacheConfig, CacheResult, InMemoryStore, KeyValueStore, Redcache, RecordingEmitter,
    RedcacheError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory store whose availability and failures can be switched at runtime
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    down: AtomicBool,
    pings_before_down: AtomicUsize,
    fail_gets: AtomicBool,
    pub pings: AtomicUsize,
    pub gets: AtomicUsize,
    pub ttls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            pings_before_down: AtomicUsize::new(usize::MAX),
            ..Default::default()
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Answer `n` more pings, then report the store as down
    pub fn go_down_after(&self, n: usize) {
        self.pings_before_down.store(n, Ordering::SeqCst);
    }

    pub fn fail_gets(&self) {
        self.fail_gets.store(true, Ordering::SeqCst);
    }

    pub fn data_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
            + self.ttls.load(Ordering::SeqCst)
            + self.inner.write_count() as usize
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(RedcacheError::store("GET failed"));
        }
        self.inner.get(key).await
    }

    async fn set_with_expiry(&self, key: &str, value: &[u8], ttl_seconds: u64) -> CacheResult<()> {
        self.inner.set_with_expiry(key, value, ttl_seconds).await
    }

    async fn ttl(&self, key: &str) -> CacheResult<i64> {
        self.ttls.fetch_add(1, Ordering::SeqCst);
        self.inner.ttl(key).await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(RedcacheError::unavailable("connection refused"));
        }
        let remaining = self.pings_before_down.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(RedcacheError::unavailable("connection dropped"));
        }
        if remaining != usize::MAX {
            self.pings_before_down.store(remaining - 1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Counts how many times computations built from it have run
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A computation returning `value` and bumping the counter
    pub fn computation<T>(
        &self,
        value: T,
    ) -> impl FnOnce() -> std::future::Ready<anyhow::Result<T>> + Send + 'static
    where
        T: Send + 'static,
    {
        let calls = self.0.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(value))
        }
    }

    pub fn calls(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn short_lived() -> CacheConfig {
    CacheConfig {
        ttl: Duration::from_secs(100),
        stale_threshold: Duration::from_secs(10),
        ..Default::default()
    }
}

pub fn engine_with(config: CacheConfig, store: Arc<FlakyStore>) -> (Redcache, Arc<RecordingEmitter>) {
    let emitter = Arc::new(RecordingEmitter::new());
    let cache = Redcache::configure(|c| {
        c.cache = config;
        c.store = Some(store);
        c.emitter = Some(emitter.clone());
    })
    .expect("engine should build");
    (cache, emitter)
}

pub fn engine(config: CacheConfig) -> (Redcache, Arc<FlakyStore>, Arc<RecordingEmitter>) {
    let store = Arc::new(FlakyStore::new());
    let (cache, emitter) = engine_with(config, store.clone());
    (cache, store, emitter)
}

/// Poll `check` until it holds or a second has passed
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

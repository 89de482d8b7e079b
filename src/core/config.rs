//! # Configuration Module
//!
//! Tunables for the cache engine and the file/environment loading around them.
//!
//! ## Key Features
//! - `CacheConfig`: the engine's tunables, with the defaults used in production
//! - `RedcacheConfig`: whole-process settings loaded from YAML or JSON
//! - Environment variable overrides (`REDCACHE_*`)
//! - `Configuration`: target of the setup callback passed to `Redcache::configure`

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::caching::encryption::{EncryptionService, TokenCipher};
use crate::caching::stores::{KeyValueStore, RedisStoreConfig};
use crate::core::error::{CacheResult, RedcacheError};
use crate::observability::config::{LogConfig, LogFormat};
use crate::observability::events::EventEmitter;

/// Cache engine tunables
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Expiry applied to every write
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// A value whose remaining lifetime drops below `ttl - stale_threshold`
    /// is served and refreshed in the background
    #[serde(with = "humantime_serde")]
    pub stale_threshold: Duration,

    /// Seal stored values with the encryption service
    pub encrypt: bool,

    /// Secret for the encryption service
    pub secret: Option<String>,

    /// Bypass the store entirely and always run the computation
    pub skip_cache: bool,

    /// Suppress all cache events
    pub silent: bool,

    /// Namespace for event names (`<prefix>.cache.hit`)
    pub event_prefix: String,

    /// Allow at most one background refresh per key at a time
    pub single_flight_refresh: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(86400),
            stale_threshold: Duration::from_secs(900),
            encrypt: false,
            secret: None,
            skip_cache: false,
            silent: false,
            event_prefix: "redcache".to_string(),
            single_flight_refresh: true,
        }
    }
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("ttl", &self.ttl)
            .field("stale_threshold", &self.stale_threshold)
            .field("encrypt", &self.encrypt)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("skip_cache", &self.skip_cache)
            .field("silent", &self.silent)
            .field("event_prefix", &self.event_prefix)
            .field("single_flight_refresh", &self.single_flight_refresh)
            .finish()
    }
}

impl CacheConfig {
    /// Reject combinations the engine cannot run with.
    ///
    /// `stale_threshold >= ttl` is allowed but logged: every read is then stale.
    pub fn validate(&self) -> CacheResult<()> {
        let mut errors = Vec::new();

        if self.ttl.as_secs() == 0 {
            errors.push("ttl must be at least one second".to_string());
        }

        if self.encrypt && self.secret.as_deref().map_or(true, str::is_empty) {
            errors.push("encrypt is enabled but no secret is set".to_string());
        }

        if !errors.is_empty() {
            return Err(RedcacheError::config(errors.join("; ")));
        }

        if self.stale_threshold >= self.ttl {
            warn!(
                ttl = ?self.ttl,
                stale_threshold = ?self.stale_threshold,
                "stale_threshold is not below ttl, every cached read will trigger a refresh"
            );
        }

        Ok(())
    }

    /// Remaining lifetime (seconds) below which a key counts as stale
    pub fn stale_cutoff(&self) -> i64 {
        self.ttl.as_secs() as i64 - self.stale_threshold.as_secs() as i64
    }
}

/// Whole-process configuration, loadable from a file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedcacheConfig {
    pub cache: CacheConfig,
    pub redis: RedisStoreConfig,
    pub logging: LogConfig,
}

impl RedcacheConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut config: RedcacheConfig = serde_yaml::from_str(&content)?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut config: RedcacheConfig = serde_json::from_str(&content)?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Durations use humantime syntax, for example `REDCACHE_TTL=12h`.
    pub fn apply_env_overrides(&mut self) -> CacheResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CacheResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ttl) = lookup("REDCACHE_TTL") {
            self.cache.ttl = humantime::parse_duration(&ttl)
                .map_err(|e| crate::config_error!("Invalid REDCACHE_TTL: {}", e))?;
        }

        if let Some(stale) = lookup("REDCACHE_STALE_THRESHOLD") {
            self.cache.stale_threshold = humantime::parse_duration(&stale).map_err(|e| {
                crate::config_error!("Invalid REDCACHE_STALE_THRESHOLD: {}", e)
            })?;
        }

        if let Some(encrypt) = lookup("REDCACHE_ENCRYPT") {
            self.cache.encrypt = encrypt
                .parse::<bool>()
                .map_err(|e| crate::config_error!("Invalid REDCACHE_ENCRYPT: {}", e))?;
        }

        if let Some(secret) = lookup("REDCACHE_SECRET") {
            self.cache.secret = Some(secret);
        }

        if let Some(skip) = lookup("REDCACHE_SKIP_CACHE") {
            self.cache.skip_cache = skip
                .parse::<bool>()
                .map_err(|e| crate::config_error!("Invalid REDCACHE_SKIP_CACHE: {}", e))?;
        }

        if let Some(silent) = lookup("REDCACHE_SILENT") {
            self.cache.silent = silent
                .parse::<bool>()
                .map_err(|e| crate::config_error!("Invalid REDCACHE_SILENT: {}", e))?;
        }

        if let Some(prefix) = lookup("REDCACHE_EVENT_PREFIX") {
            self.cache.event_prefix = prefix;
        }

        if let Some(url) = lookup("REDCACHE_REDIS_URL") {
            self.redis.url = url;
        }

        if let Some(level) = lookup("REDCACHE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("REDCACHE_LOG_FORMAT") {
            self.logging.format = format
                .parse::<LogFormat>()
                .map_err(|e| crate::config_error!("Invalid REDCACHE_LOG_FORMAT: {}", e))?;
        }

        Ok(())
    }

    /// Validate the whole configuration, aggregating every problem found
    pub fn validate(&self) -> CacheResult<()> {
        let mut errors = Vec::new();

        if let Err(RedcacheError::Configuration { message }) = self.cache.validate() {
            errors.push(message);
        }

        if self.redis.url.is_empty() {
            errors.push("redis.url cannot be empty".to_string());
        }

        if self.redis.operation_timeout.is_zero() {
            errors.push("redis.operation_timeout must be greater than 0".to_string());
        }

        if !errors.is_empty() {
            return Err(RedcacheError::config(errors.join("; ")));
        }
        Ok(())
    }
}

/// Everything the engine needs, filled in by the setup callback.
pub struct Configuration {
    pub cache: CacheConfig,
    pub store: Option<Arc<dyn KeyValueStore>>,
    pub emitter: Option<Arc<dyn EventEmitter>>,
    pub cipher: Arc<dyn EncryptionService>,
}

impl Configuration {
    pub fn new(cache: CacheConfig) -> Self {
        Self {
            cache,
            store: None,
            emitter: None,
            cipher: Arc::new(TokenCipher::new()),
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(86400));
        assert_eq!(config.stale_threshold, Duration::from_secs(900));
        assert!(!config.encrypt);
        assert!(config.secret.is_none());
        assert!(!config.skip_cache);
        assert_eq!(config.event_prefix, "redcache");
        assert_eq!(config.stale_cutoff(), 85500);
    }

    #[test]
    fn test_encrypt_without_secret_is_rejected() {
        let config = CacheConfig {
            encrypt: true,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RedcacheError::Configuration { .. })
        ));

        let config = CacheConfig {
            encrypt: true,
            secret: Some(String::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CacheConfig {
            encrypt: true,
            secret: Some("foo".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_above_ttl_is_only_a_warning() {
        let config = CacheConfig {
            ttl: Duration::from_secs(10),
            stale_threshold: Duration::from_secs(20),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.stale_cutoff(), -10);
    }

    #[test]
    fn test_overrides() {
        let mut config = RedcacheConfig::default();
        config
            .apply_overrides(vars(&[
                ("REDCACHE_TTL", "1h"),
                ("REDCACHE_STALE_THRESHOLD", "5m"),
                ("REDCACHE_ENCRYPT", "true"),
                ("REDCACHE_SECRET", "s3cret"),
                ("REDCACHE_EVENT_PREFIX", "billing"),
                ("REDCACHE_REDIS_URL", "redis://cache:6379"),
                ("REDCACHE_LOG_FORMAT", "text"),
            ]))
            .unwrap();

        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert_eq!(config.cache.stale_threshold, Duration::from_secs(300));
        assert!(config.cache.encrypt);
        assert_eq!(config.cache.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.cache.event_prefix, "billing");
        assert_eq!(config.redis.url, "redis://cache:6379");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_override_is_reported() {
        let mut config = RedcacheConfig::default();
        let err = config
            .apply_overrides(vars(&[("REDCACHE_SKIP_CACHE", "sometimes")]))
            .unwrap_err();
        assert!(err.to_string().contains("REDCACHE_SKIP_CACHE"));
    }

    #[test]
    fn test_validate_aggregates_errors() {
        let mut config = RedcacheConfig::default();
        config.cache.encrypt = true;
        config.redis.url = String::new();

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("no secret"));
        assert!(message.contains("redis.url"));
    }

    #[test]
    fn test_yaml_uses_humantime_durations() {
        let yaml = r#"
cache:
  ttl: 2h
  stale_threshold: 10m
  event_prefix: api
redis:
  url: redis://localhost:6380
  operation_timeout: 250ms
logging:
  level: debug
  format: text
"#;
        let config: RedcacheConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cache.ttl, Duration::from_secs(7200));
        assert_eq!(config.cache.stale_threshold, Duration::from_secs(600));
        assert_eq!(config.cache.event_prefix, "api");
        assert!(!config.cache.encrypt);
        assert_eq!(config.redis.operation_timeout, Duration::from_millis(250));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = CacheConfig {
            secret: Some("hunter2".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}

//! # Error Handling
//!
//! Error types for the cache layer, built on `thiserror`.
//!
//! Only a few of these ever reach a caller of [`crate::Redcache::cache`]:
//! connectivity failures are absorbed by the store adapter and undecodable
//! records are treated as misses. What remains (a store operation failing after
//! a successful ping, a serialization failure, a misconfiguration at build time)
//! is returned as a [`RedcacheError`] and converted into the caller's own error
//! type through `From`.

use thiserror::Error;

/// Result type used throughout the crate
pub type CacheResult<T> = Result<T, RedcacheError>;

/// Error types produced by the cache layer
#[derive(Debug, Error)]
pub enum RedcacheError {
    /// Invalid or incomplete configuration, reported when the engine is built
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Backing store failure that is not a Redis client error
    #[error("Cache store error: {message}")]
    Store { message: String },

    /// Redis client errors (connection, protocol, command)
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Token generation failures inside the encryption service
    #[error("Encryption error: {message}")]
    Encryption { message: String },

    /// Store operation exceeded its client-side timeout
    #[error("Cache operation timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Store could not be reached
    #[error("Cache store unavailable: {reason}")]
    Unavailable { reason: String },

    /// I/O errors (config files)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl RedcacheError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a store error with a custom message
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create an encryption error with a custom message
    pub fn encryption<S: Into<String>>(message: S) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Create an unavailable error with a custom reason
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether this error means the store cannot be reached at all.
    ///
    /// These are the failures the availability probe turns into "down".
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Unavailable { .. } => true,
            Self::Redis(err) => {
                err.is_io_error()
                    || err.is_timeout()
                    || err.is_connection_refusal()
                    || err.is_connection_dropped()
            }
            _ => false,
        }
    }

    /// Get a string representation of the error type for logs and events
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::Store { .. } => "store_error",
            Self::Redis(_) => "redis_error",
            Self::Serialization(_) => "serialization_error",
            Self::Encryption { .. } => "encryption_error",
            Self::Timeout { .. } => "timeout",
            Self::Unavailable { .. } => "unavailable",
            Self::Io { .. } => "io_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }
}

impl From<std::io::Error> for RedcacheError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for RedcacheError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("Invalid ttl: {}", ttl)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::RedcacheError::config(format!($($arg)*))
    };
}

pub mod config;
pub mod error;

pub use config::{CacheConfig, Configuration, RedcacheConfig};
pub use error::{CacheResult, RedcacheError};

//! # Structured Logging
//!
//! Installs the process-wide `tracing` subscriber. Hosts that already install
//! their own subscriber can skip this; the crate only ever logs through the
//! `tracing` macros.

use tracing::{warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::observability::config::{LogConfig, LogFormat};

/// Parse a level name, falling back to `INFO` for anything unrecognised
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the tracing subscriber.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case the existing one is left untouched.
pub fn init_logging(config: &LogConfig) -> bool {
    let env_filter = EnvFilter::from_default_env().add_directive(parse_level(&config.level).into());

    let installed = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
            .is_ok(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .is_ok(),
    };

    if !installed {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("loud"), Level::INFO);
    }

    #[test]
    fn test_second_init_is_tolerated() {
        let config = LogConfig {
            level: "debug".to_string(),
            format: LogFormat::Text,
        };
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}

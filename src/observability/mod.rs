// Core observability configuration
pub mod config;

// Cache event sinks
pub mod events;

// Structured logging
pub mod logging;

// Re-export commonly used types for convenience
pub use config::{LogConfig, LogFormat};
pub use events::{
    CacheEvent, CompositeEmitter, EventEmitter, EventFields, MetricsEmitter, NoopEmitter,
    RecordedEvent, RecordingEmitter, TracingEmitter,
};
pub use logging::init_logging;

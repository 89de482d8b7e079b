//! # Cache Events
//!
//! Write-only sink for the engine's operational events (`cache.hit`,
//! `cache.miss`, `cache.write`, `cache.stale_refresh`, `cache.refresh_failed`).
//! Emitting is fire-and-forget: implementations must not block or fail the
//! caller.

use metrics::counter;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Structured fields attached to an event
pub type EventFields = HashMap<String, Value>;

/// Events emitted by the cache engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEvent {
    Hit,
    Miss,
    Write,
    StaleRefresh,
    RefreshFailed,
}

impl CacheEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::Miss => "cache.miss",
            Self::Write => "cache.write",
            Self::StaleRefresh => "cache.stale_refresh",
            Self::RefreshFailed => "cache.refresh_failed",
        }
    }

    /// Full event name under `prefix`, joined with `.`
    pub fn qualified(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            self.as_str().to_string()
        } else {
            format!("{}.{}", prefix, self.as_str())
        }
    }
}

impl std::fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability interface for event sinks
pub trait EventEmitter: Send + Sync {
    fn emit(&self, name: &str, fields: &EventFields);
}

/// Emits events as structured `tracing` records under the `redcache::events` target
#[derive(Debug, Clone, Default)]
pub struct TracingEmitter;

impl EventEmitter for TracingEmitter {
    fn emit(&self, name: &str, fields: &EventFields) {
        let rendered = serde_json::to_string(fields).unwrap_or_default();
        info!(target: "redcache::events", event = name, fields = %rendered, "{}", name);
    }
}

/// Counts events through the `metrics` facade, one counter per event name
#[derive(Debug, Clone, Default)]
pub struct MetricsEmitter;

impl EventEmitter for MetricsEmitter {
    fn emit(&self, name: &str, _fields: &EventFields) {
        counter!(name.to_string()).increment(1);
    }
}

/// Discards every event
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn emit(&self, _name: &str, _fields: &EventFields) {}
}

/// Forwards every event to each inner emitter in order
#[derive(Clone, Default)]
pub struct CompositeEmitter {
    emitters: Vec<Arc<dyn EventEmitter>>,
}

impl CompositeEmitter {
    pub fn new(emitters: Vec<Arc<dyn EventEmitter>>) -> Self {
        Self { emitters }
    }

    pub fn with(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitters.push(emitter);
        self
    }
}

impl EventEmitter for CompositeEmitter {
    fn emit(&self, name: &str, fields: &EventFields) {
        for emitter in &self.emitters {
            emitter.emit(name, fields);
        }
    }
}

/// A single recorded event
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub name: String,
    pub fields: EventFields,
}

/// Keeps every event in memory for inspection
#[derive(Debug, Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.name).collect()
    }

    /// Number of recorded events called `name`
    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name == name).count()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, name: &str, fields: &EventFields) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                name: name.to_string(),
                fields: fields.clone(),
            });
        }
    }
}

//! # Background Refresh Tracking
//!
//! Keys with a stale-refresh task currently running. Claiming a key is an
//! atomic check-and-insert, so at most one refresh per key is in flight; the
//! returned guard releases the key when dropped, whether the refresh finished,
//! failed, or panicked.

use dashmap::DashMap;
use std::sync::Arc;

/// Registry of keys with a refresh in flight
#[derive(Debug, Clone, Default)]
pub struct RefreshRegistry {
    in_flight: Arc<DashMap<String, ()>>,
}

impl RefreshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` if a refresh for it is already running
    pub fn try_claim(&self, key: &str) -> Option<RefreshGuard> {
        use dashmap::mapref::entry::Entry;

        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(RefreshGuard {
                    key: key.to_string(),
                    in_flight: self.in_flight.clone(),
                })
            }
        }
    }

    pub fn is_refreshing(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Number of refreshes currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Held by a running refresh; releases its key on drop
#[derive(Debug)]
pub struct RefreshGuard {
    key: String,
    in_flight: Arc<DashMap<String, ()>>,
}

impl RefreshGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

//! Bridge tuning: tick interval, queue bound and direction tags

use crate::communication::DEFAULT_QUEUE_CAPACITY;
use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default relay tick interval
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 20;

/// Relay configuration shared by both directions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Period of each relay worker's tick
    pub tick_interval_ms: u64,

    /// Capacity of each direction's ingress queue
    pub queue_capacity: usize,

    /// Authority prefix for samples relayed from bus A
    pub tag_a: String,

    /// Authority prefix for samples relayed from bus B
    pub tag_b: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            tag_a: "a".to_string(),
            tag_b: "b".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Set both direction tags (chainable)
    pub fn with_tags(mut self, tag_a: &str, tag_b: &str) -> Self {
        self.tag_a = tag_a.to_string();
        self.tag_b = tag_b.to_string();
        self
    }

    /// Set the tick interval (chainable)
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the per-direction queue capacity (chainable)
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> RelayResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(RelayError::config("tick_interval_ms must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(RelayError::config("queue_capacity must be at least 1"));
        }
        if self.tag_a.is_empty() || self.tag_b.is_empty() {
            return Err(RelayError::config("direction tags must not be empty"));
        }
        if self.tag_a.contains(':') || self.tag_b.contains(':') {
            return Err(RelayError::config(
                "direction tags must not contain ':' (it separates tag and authority)",
            ));
        }
        Ok(())
    }
}

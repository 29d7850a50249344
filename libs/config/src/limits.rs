//! Relay limits
//!
//! The queue capacity and byte ceiling used to be fixed constants; they are
//! carried here with the same defaults.

use crate::{ConfigError, Result};
use network::{Framing, MAX_FRAME_LEN};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Messages held per queue before the oldest is evicted
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Per-envelope byte ceiling (1 GiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024 * 1024;

/// Largest single read in `single_read` framing
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Client worker wake-up interval when the queue stays empty
pub const DEFAULT_IDLE_POLL_INTERVAL_MS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayLimits {
    pub queue_capacity: usize,
    pub max_message_size: usize,
    pub framing: Framing,
    pub read_chunk_size: usize,
    pub idle_poll_interval_ms: u64,
}

impl Default for RelayLimits {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            framing: Framing::default(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            idle_poll_interval_ms: DEFAULT_IDLE_POLL_INTERVAL_MS,
        }
    }
}

impl RelayLimits {
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("queue_capacity", "must be > 0"));
        }

        if self.max_message_size == 0 {
            return Err(ConfigError::invalid("max_message_size", "must be > 0"));
        }

        if self.framing == Framing::LengthPrefixed && self.max_message_size > MAX_FRAME_LEN {
            return Err(ConfigError::invalid(
                "max_message_size",
                format!("must be <= {MAX_FRAME_LEN} with length-prefixed framing"),
            ));
        }

        if self.read_chunk_size == 0 {
            return Err(ConfigError::invalid("read_chunk_size", "must be > 0"));
        }

        Ok(())
    }
}

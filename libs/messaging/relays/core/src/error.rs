//! # Relay Error Types
//!
//! Errors surfaced while setting up queues and workers. Failures inside a
//! running relay loop are counted in [`crate::RelayStats`] instead.

use network::TransportError;
use thiserror::Error;

/// Relay operation errors
#[derive(Error, Debug)]
pub enum RelayError {
    /// Transport layer errors while handing the stream to the worker
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Worker thread or process could not be created
    #[error("Failed to spawn relay worker: {reason}")]
    Spawn { reason: String },

    /// Worker-process channel errors
    #[error("IPC queue error: {reason}")]
    Ipc { reason: String },

    /// A concurrency unit not available on this platform
    #[error("{feature} is not supported on this platform")]
    Unsupported { feature: &'static str },

    /// The worker thread panicked
    #[error("Relay worker panicked")]
    WorkerPanicked,

    /// IO errors from runtime or socket setup
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    pub fn spawn(reason: impl Into<String>) -> Self {
        Self::Spawn {
            reason: reason.into(),
        }
    }

    pub fn ipc(reason: impl Into<String>) -> Self {
        Self::Ipc {
            reason: reason.into(),
        }
    }
}

/// Result type for relay operations
pub type RelayResult<T> = std::result::Result<T, RelayError>;

use network::TransportError;
use relay_config::{ConfigError, Mode};
use relay_core::RelayError;
use thiserror::Error;

/// Errors returned by [`crate::StateMonitor`]
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("'{operation}' can be used only in {} mode, monitor is in {mode} mode", expected_mode(.operation))]
    RoleMismatch {
        operation: &'static str,
        mode: Mode,
    },

    #[error("monitor not started")]
    NotStarted,

    #[error("monitor already started")]
    AlreadyStarted,

    #[error("monitor has been stopped")]
    Stopped,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

fn expected_mode(operation: &str) -> &'static str {
    match operation {
        "get" => "host",
        _ => "client",
    }
}

impl MonitorError {
    pub fn is_role_mismatch(&self) -> bool {
        matches!(self, MonitorError::RoleMismatch { .. })
    }

    /// A blocking `start()` was interrupted through the shutdown handle
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MonitorError::Transport(TransportError::Cancelled { .. }))
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;

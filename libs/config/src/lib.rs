//! # State Monitor Configuration
//!
//! Everything a monitor needs before it opens a socket: its role, the
//! address of the connection, the concurrency unit that runs the relay
//! worker, and the limits the worker enforces.
//!
//! ## Usage
//!
//! ```rust
//! use relay_config::{Mode, MonitorConfig};
//!
//! let config = MonitorConfig::from_toml_str(r#"
//!     mode = "Host"
//!     host = "127.0.0.1"
//!     port = 9999
//!
//!     [limits]
//!     queue_capacity = 16
//! "#).unwrap();
//!
//! assert_eq!(config.mode, Mode::Host);
//! assert_eq!(config.limits.queue_capacity, 16);
//! ```
//!
//! Files loaded with [`MonitorConfig::load`] can be overridden from the
//! environment, e.g. `STATE_MONITOR__PORT=9000` or
//! `STATE_MONITOR__LIMITS__FRAMING=single_read`.

pub mod error;
pub mod limits;
pub mod monitor;

pub use error::{ConfigError, Result};
pub use limits::{
    RelayLimits, DEFAULT_IDLE_POLL_INTERVAL_MS, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_READ_CHUNK_SIZE,
};
pub use monitor::{Mode, MonitorConfig, ProcessType, ENV_PREFIX};
pub use network::Framing;

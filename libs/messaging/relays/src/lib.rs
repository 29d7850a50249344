//! # State Monitor
//!
//! Relays state messages, maps of named values that may include raw
//! numeric tensors, between two peers over one TCP connection.
//!
//! The host accepts the connection and polls received messages with
//! [`StateMonitor::get`]; the client connects and publishes with
//! [`StateMonitor::put`]. A background relay worker moves envelopes between
//! the socket and a bounded drop-oldest queue, so neither call blocks.
//!
//! ```no_run
//! use state_relay::{MonitorConfig, StateMessage, StateMonitor};
//!
//! # fn main() -> Result<(), state_relay::MonitorError> {
//! let mut client = StateMonitor::new(MonitorConfig::client("127.0.0.1", 9999))?;
//! client.start()?;
//! client.put(StateMessage::new().with("x", 1).expect("not the sentinel key"))?;
//! client.end()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod monitor;

pub use error::{MonitorError, Result};
pub use monitor::{MonitorState, StateMonitor, RUNNING_MESSAGE};

pub use network::{default_print_callback, PrintCallback, ShutdownHandle};
pub use relay_config::{Framing, Mode, MonitorConfig, ProcessType, RelayLimits};
pub use relay_core::RelayStatsSnapshot;
pub use types::{DType, StateMessage, Tensor, Value};

//! Network layer for the state monitor
//!
//! Connection establishment between Host and Client, stream framing, the
//! lifecycle status sink and shutdown signalling shared by the facade and
//! its relay worker.

pub mod error;
pub mod framing;
pub mod shutdown;
pub mod status;
pub mod transports;

pub use error::{Result, TransportError};
pub use framing::{read_frame, write_frame, Framing, FRAME_HEADER_LEN, MAX_FRAME_LEN};
pub use shutdown::{shutdown_channel, ShutdownHandle, ShutdownSignal};
pub use status::{default_print_callback, PrintCallback, StatusSink};
pub use transports::{
    EstablishedStream, Inbound, TcpConnection, TcpConnectionStats, TcpConnector,
    DEFAULT_LISTEN_BACKLOG,
};

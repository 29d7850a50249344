//! Transport Layer
//!
//! TCP is the only transport between monitor peers; the worker-process
//! channel lives in the relay crate and reuses [`crate::framing`].

pub mod tcp;


pub use tcp::{
    EstablishedStream, Inbound, TcpConnection, TcpConnectionStats, TcpConnector,
    DEFAULT_LISTEN_BACKLOG,
};

//! TCP Transport
//!
//! Establishes the single monitor connection (Host accepts exactly one
//! client, Client connects once) and moves framed envelopes over it.

use crate::framing::{frame_header, Framing, FRAME_HEADER_LEN};
use crate::shutdown::ShutdownSignal;
use crate::status::StatusSink;
use crate::{Result, TransportError};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, info, warn};

/// Default pending-connection backlog for the host listener
pub const DEFAULT_LISTEN_BACKLOG: u32 = 5;

/// A connected socket ready to be handed to a relay worker
///
/// The socket is in non-blocking mode so it can be re-registered with
/// whichever runtime the worker builds.
#[derive(Debug)]
pub struct EstablishedStream {
    pub stream: std::net::TcpStream,
    pub peer_addr: SocketAddr,
    pub local_addr: SocketAddr,
}

impl EstablishedStream {
    fn from_tokio(stream: TcpStream, peer_addr: SocketAddr) -> Result<Self> {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let local_addr = stream
            .local_addr()
            .map_err(|e| TransportError::network_with_source("Failed to get local address", e))?;
        let stream = stream
            .into_std()
            .map_err(|e| TransportError::network_with_source("Failed to detach TCP stream", e))?;
        Ok(Self {
            stream,
            peer_addr,
            local_addr,
        })
    }
}

/// Opens the one monitor connection, reporting milestones to the status sink
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    backlog: u32,
    status: StatusSink,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, status: StatusSink) -> Self {
        Self {
            host: host.into(),
            port,
            backlog: DEFAULT_LISTEN_BACKLOG,
            status,
        }
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Bind, listen and block until exactly one client connects
    ///
    /// The listener is dropped after the first accept; later clients are
    /// refused.
    pub async fn accept_one(&self, shutdown: &mut ShutdownSignal) -> Result<EstablishedStream> {
        let bind_addr = self.resolve().await?;

        let socket = TcpSocket::new_v4()
            .map_err(|e| TransportError::network_with_source("Failed to create TCP socket", e))?;
        socket
            .set_reuseaddr(true)
            .map_err(|e| TransportError::network_with_source("Failed to set SO_REUSEADDR", e))?;
        socket.bind(bind_addr).map_err(|e| {
            TransportError::connection_with_source("Failed to bind TCP listener", Some(bind_addr), e)
        })?;
        let listener = socket
            .listen(self.backlog)
            .map_err(|e| TransportError::network_with_source("Failed to listen", e))?;

        info!(addr = %bind_addr, backlog = self.backlog, "TCP host listening");
        self.status.emit("Waiting for client connecting...");

        let (stream, peer_addr) = tokio::select! {
            accepted = listener.accept() => accepted.map_err(|e| {
                TransportError::network_with_source("Failed to accept TCP connection", e)
            })?,
            _ = shutdown.triggered() => return Err(TransportError::cancelled("accept")),
        };
        drop(listener);

        info!(peer = %peer_addr, "Accepted TCP connection");
        self.status.emit(&format!("Client @ {peer_addr} connected!"));
        EstablishedStream::from_tokio(stream, peer_addr)
    }

    /// Connect once to the host; no retry
    pub async fn connect(&self, shutdown: &mut ShutdownSignal) -> Result<EstablishedStream> {
        self.status
            .emit(&format!("Connecting to host @ {}:{}...", self.host, self.port));
        let remote_addr = self.resolve().await?;

        let stream = tokio::select! {
            connected = TcpStream::connect(remote_addr) => connected.map_err(|e| {
                TransportError::connection_with_source("Failed to connect to TCP peer", Some(remote_addr), e)
            })?,
            _ = shutdown.triggered() => return Err(TransportError::cancelled("connect")),
        };

        info!(peer = %remote_addr, "Connected to TCP host");
        self.status.emit("Host connected!");
        EstablishedStream::from_tokio(stream, remote_addr)
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                TransportError::network_with_source(format!("Failed to resolve '{}'", self.host), e)
            })?;
        addrs.find(SocketAddr::is_ipv4).ok_or_else(|| {
            TransportError::configuration(
                format!("no IPv4 address for '{}'", self.host),
                Some("host"),
            )
        })
    }
}

/// Result of one receive on a [`TcpConnection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One envelope's bytes
    Frame(Bytes),
    /// A length-prefixed frame above the size ceiling; its bytes were skipped
    Oversized { len: usize },
    /// Peer closed the stream
    Closed,
}

/// One direction of the monitor connection with reusable buffers
pub struct TcpConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    framing: Framing,
    read_chunk_size: usize,
    connected_at: Instant,
    last_activity: Instant,
    bytes_sent: u64,
    bytes_received: u64,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
}

impl TcpConnection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, framing: Framing, read_chunk_size: usize) -> Self {
        let now = Instant::now();
        Self {
            stream,
            peer_addr,
            framing,
            read_chunk_size: read_chunk_size.max(1),
            connected_at: now,
            last_activity: now,
            bytes_sent: 0,
            bytes_received: 0,
            read_buffer: BytesMut::with_capacity(64 * 1024),
            write_buffer: BytesMut::with_capacity(64 * 1024),
        }
    }

    /// Register an established stream with the current runtime
    pub fn from_established(established: EstablishedStream, framing: Framing, read_chunk_size: usize) -> Result<Self> {
        let peer_addr = established.peer_addr;
        established
            .stream
            .set_nonblocking(true)
            .map_err(|e| TransportError::network_with_source("Failed to set non-blocking mode", e))?;
        let stream = TcpStream::from_std(established.stream)
            .map_err(|e| TransportError::network_with_source("Failed to register TCP stream", e))?;
        Ok(Self::new(stream, peer_addr, framing, read_chunk_size))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Send one envelope
    pub async fn send_message(&mut self, data: &[u8]) -> Result<()> {
        let written = match self.framing {
            Framing::LengthPrefixed => {
                self.write_buffer.clear();
                self.write_buffer.extend_from_slice(&frame_header(data.len())?);
                self.write_buffer.extend_from_slice(data);
                self.stream
                    .write_all(&self.write_buffer)
                    .await
                    .map_err(|e| TransportError::from_io("Failed to write message", Some(self.peer_addr), e))?;
                FRAME_HEADER_LEN + data.len()
            }
            Framing::SingleRead => {
                self.stream
                    .write_all(data)
                    .await
                    .map_err(|e| TransportError::from_io("Failed to write message", Some(self.peer_addr), e))?;
                data.len()
            }
        };

        self.stream
            .flush()
            .await
            .map_err(|e| TransportError::from_io("Failed to flush TCP stream", Some(self.peer_addr), e))?;

        self.bytes_sent += written as u64;
        self.last_activity = Instant::now();

        debug!(
            peer = %self.peer_addr,
            bytes = data.len(),
            total_sent = self.bytes_sent,
            "Sent envelope over TCP"
        );
        Ok(())
    }

    /// Receive one envelope, skipping length-prefixed frames above `max_size`
    pub async fn receive_message(&mut self, max_size: usize) -> Result<Inbound> {
        match self.framing {
            Framing::LengthPrefixed => self.receive_prefixed(max_size).await,
            Framing::SingleRead => self.receive_single(max_size).await,
        }
    }

    async fn receive_prefixed(&mut self, max_size: usize) -> Result<Inbound> {
        let mut len_bytes = [0u8; FRAME_HEADER_LEN];
        if let Err(e) = self.stream.read_exact(&mut len_bytes).await {
            return self.closed_or_err(e, "Failed to read message length");
        }
        let message_len = u32::from_be_bytes(len_bytes) as usize;

        if message_len > max_size {
            let mut body = (&mut self.stream).take(message_len as u64);
            let drained = tokio::io::copy(&mut body, &mut tokio::io::sink())
                .await
                .map_err(|e| TransportError::from_io("Failed to skip oversized message", Some(self.peer_addr), e))?;
            self.bytes_received += (FRAME_HEADER_LEN as u64) + drained;
            if drained < message_len as u64 {
                return Ok(Inbound::Closed);
            }
            warn!(peer = %self.peer_addr, bytes = message_len, max = max_size, "Skipped oversized envelope");
            return Ok(Inbound::Oversized { len: message_len });
        }

        self.read_buffer.clear();
        self.read_buffer.resize(message_len, 0);
        if let Err(e) = self.stream.read_exact(&mut self.read_buffer).await {
            return self.closed_or_err(e, "Failed to read message data");
        }

        self.bytes_received += (FRAME_HEADER_LEN + message_len) as u64;
        self.last_activity = Instant::now();

        debug!(
            peer = %self.peer_addr,
            bytes = message_len,
            total_received = self.bytes_received,
            "Received envelope over TCP"
        );
        Ok(Inbound::Frame(self.read_buffer.split_to(message_len).freeze()))
    }

    async fn receive_single(&mut self, max_size: usize) -> Result<Inbound> {
        let limit = self.read_chunk_size.min(max_size).max(1);
        self.read_buffer.clear();
        self.read_buffer.reserve(limit);

        let mut limited = (&mut self.stream).take(limit as u64);
        let n = match limited.read_buf(&mut self.read_buffer).await {
            Ok(0) => return Ok(Inbound::Closed),
            Ok(n) => n,
            Err(e) => return self.closed_or_err(e, "Failed to read from TCP stream"),
        };

        self.bytes_received += n as u64;
        self.last_activity = Instant::now();
        debug!(peer = %self.peer_addr, bytes = n, "Received raw read over TCP");
        Ok(Inbound::Frame(self.read_buffer.split_to(n).freeze()))
    }

    fn closed_or_err(&self, e: std::io::Error, context: &str) -> Result<Inbound> {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            debug!(peer = %self.peer_addr, "TCP peer closed the stream");
            return Ok(Inbound::Closed);
        }
        Err(TransportError::from_io(context, Some(self.peer_addr), e))
    }

    /// Shut down the write half; the peer sees end of stream
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Error shutting down TCP connection: {}", e);
        }
    }

    pub fn stats(&self) -> TcpConnectionStats {
        TcpConnectionStats {
            peer_addr: self.peer_addr,
            connected_duration: self.connected_at.elapsed(),
            last_activity: self.last_activity.elapsed(),
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
        }
    }
}

/// TCP connection statistics
#[derive(Debug, Clone)]
pub struct TcpConnectionStats {
    pub peer_addr: SocketAddr,
    pub connected_duration: Duration,
    pub last_activity: Duration,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

//! # Relay Worker
//!
//! Pumps envelopes in one direction for the lifetime of a monitor:
//!
//! - **Host inbound**: socket → decode → queue
//! - **Client outbound**: queue → encode → socket
//!
//! Read, decode and write failures never escape the loop. They are counted
//! in [`RelayStats`] and the loop carries on, except when the peer is gone:
//! then the worker marks the connection lost and returns. The facade still
//! answers `get()` with "no message", so a dead relay looks idle to callers.

use crate::queue::{Endpoint, MessageQueue};
use crate::stats::RelayStats;
use crate::RelayResult;
use network::{EstablishedStream, Inbound, ShutdownHandle, ShutdownSignal, TcpConnection};
use relay_config::{Mode, RelayLimits};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which way a worker moves data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Socket to queue; the worker produces
    HostInbound,
    /// Queue to socket; the worker consumes
    ClientOutbound,
}

impl Direction {
    /// Queue side used by the worker
    pub fn worker_endpoint(&self) -> Endpoint {
        match self {
            Direction::HostInbound => Endpoint::Producer,
            Direction::ClientOutbound => Endpoint::Consumer,
        }
    }

    /// Queue side used by the monitor facade
    pub fn facade_endpoint(&self) -> Endpoint {
        match self {
            Direction::HostInbound => Endpoint::Consumer,
            Direction::ClientOutbound => Endpoint::Producer,
        }
    }
}

impl From<Mode> for Direction {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Host => Direction::HostInbound,
            Mode::Client => Direction::ClientOutbound,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::HostInbound => "host_inbound",
            Direction::ClientOutbound => "client_outbound",
        })
    }
}

/// Everything a worker owns once spawned
pub struct RelayJob {
    pub direction: Direction,
    pub stream: EstablishedStream,
    pub queue: Arc<dyn MessageQueue>,
    pub limits: RelayLimits,
    pub stats: RelayStats,
    pub shutdown: ShutdownHandle,
}

/// Run one worker until shutdown or loss of the connection
///
/// Must be called inside a tokio runtime with IO and time drivers enabled.
pub async fn run_relay(job: RelayJob) -> RelayResult<()> {
    let RelayJob {
        direction,
        stream,
        queue,
        limits,
        stats,
        shutdown,
    } = job;

    queue.attach(direction.worker_endpoint())?;
    let mut connection = TcpConnection::from_established(stream, limits.framing, limits.read_chunk_size)?;
    let peer = connection.peer_addr();
    let signal = shutdown.signal();

    info!(%direction, %peer, framing = %limits.framing, "Relay worker started");

    match direction {
        Direction::HostInbound => host_inbound(&mut connection, queue.as_ref(), &limits, &stats, signal).await,
        Direction::ClientOutbound => client_outbound(&mut connection, queue.as_ref(), &limits, &stats, signal).await,
    }

    let summary = stats.snapshot();
    let wire = connection.stats();
    info!(
        %direction,
        %peer,
        connected_for = ?wire.connected_duration,
        idle_for = ?wire.last_activity,
        bytes_sent = wire.bytes_sent,
        bytes_received = wire.bytes_received,
        relayed = summary.messages_relayed,
        decode_failures = summary.decode_failures,
        oversized = summary.oversized_dropped,
        transport_errors = summary.transport_errors,
        connection_lost = summary.connection_lost,
        "Relay worker stopped"
    );
    Ok(())
}

async fn host_inbound(
    connection: &mut TcpConnection,
    queue: &dyn MessageQueue,
    limits: &RelayLimits,
    stats: &RelayStats,
    mut shutdown: ShutdownSignal,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            received = connection.receive_message(limits.max_message_size) => received,
        };

        match received {
            Ok(Inbound::Frame(bytes)) => match codec::decode_checked(&bytes) {
                Ok(message) => {
                    stats.record_relayed(bytes.len());
                    if queue.put_overflow_aware(message).is_some() {
                        stats.record_eviction();
                    }
                }
                Err(e) => {
                    stats.record_decode_failure();
                    debug!(error = %e, reason = e.category(), bytes = bytes.len(), "Discarded non-envelope read");
                }
            },
            Ok(Inbound::Oversized { len }) => {
                stats.record_oversized();
                debug!(bytes = len, max = limits.max_message_size, "Discarded oversized envelope");
            }
            Ok(Inbound::Closed) => {
                stats.mark_connection_lost();
                info!(peer = %connection.peer_addr(), "Client closed the connection");
                break;
            }
            Err(e) => {
                stats.record_transport_error();
                if e.is_fatal() {
                    stats.mark_connection_lost();
                    warn!(error = %e, "Connection lost, host relay exiting");
                    break;
                }
                debug!(error = %e, "Transient read error");
                tokio::time::sleep(limits.idle_poll_interval()).await;
            }
        }
    }
}

async fn client_outbound(
    connection: &mut TcpConnection,
    queue: &dyn MessageQueue,
    limits: &RelayLimits,
    stats: &RelayStats,
    mut shutdown: ShutdownSignal,
) {
    let notify = queue.notifier();
    let idle = limits.idle_poll_interval();

    loop {
        if shutdown.is_triggered() {
            break;
        }

        let Some(message) = queue.try_get() else {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = notify.notified() => {}
                _ = tokio::time::sleep(idle) => {}
            }
            continue;
        };

        let bytes = match codec::encode(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                stats.record_encode_failure();
                debug!(error = %e, "Dropped unencodable message");
                continue;
            }
        };

        if bytes.len() > limits.max_message_size {
            stats.record_oversized();
            debug!(bytes = bytes.len(), max = limits.max_message_size, "Dropped oversized envelope");
            continue;
        }

        let sent = tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            sent = connection.send_message(&bytes) => sent,
        };

        match sent {
            Ok(()) => stats.record_relayed(bytes.len()),
            Err(e) => {
                stats.record_transport_error();
                if e.is_fatal() {
                    stats.mark_connection_lost();
                    warn!(error = %e, "Connection lost, client relay exiting");
                    break;
                }
                debug!(error = %e, "Dropped envelope after write error");
            }
        }
    }

    connection.shutdown().await;
}

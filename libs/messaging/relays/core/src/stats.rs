//! Relay worker counters
//!
//! Lock-free counters shared between the worker and whoever observes it.
//! Failures the relay loops swallow land here rather than disappearing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    messages_relayed: AtomicU64,
    bytes_relayed: AtomicU64,
    decode_failures: AtomicU64,
    encode_failures: AtomicU64,
    oversized_dropped: AtomicU64,
    transport_errors: AtomicU64,
    queue_evictions: AtomicU64,
    connection_lost: AtomicBool,
}

/// Shared handle to one worker's counters
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    counters: Arc<Counters>,
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    /// Envelopes decoded and queued (host) or written to the socket (client)
    pub messages_relayed: u64,
    pub bytes_relayed: u64,
    /// Reads that were not one of our envelopes
    pub decode_failures: u64,
    pub encode_failures: u64,
    /// Envelopes above the byte ceiling, skipped on either side
    pub oversized_dropped: u64,
    pub transport_errors: u64,
    /// Queued messages discarded to admit newer ones
    pub queue_evictions: u64,
    /// The peer closed or reset the connection; the worker has exited
    pub connection_lost: bool,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_relayed(&self, bytes: usize) {
        self.counters.messages_relayed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_relayed
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_failure(&self) {
        self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_encode_failure(&self) {
        self.counters.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_oversized(&self) {
        self.counters.oversized_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transport_error(&self) {
        self.counters.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eviction(&self) {
        self.counters.queue_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_connection_lost(&self) {
        self.counters.connection_lost.store(true, Ordering::Release);
    }

    pub fn connection_lost(&self) -> bool {
        self.counters.connection_lost.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        let c = &self.counters;
        RelayStatsSnapshot {
            messages_relayed: c.messages_relayed.load(Ordering::Relaxed),
            bytes_relayed: c.bytes_relayed.load(Ordering::Relaxed),
            decode_failures: c.decode_failures.load(Ordering::Relaxed),
            encode_failures: c.encode_failures.load(Ordering::Relaxed),
            oversized_dropped: c.oversized_dropped.load(Ordering::Relaxed),
            transport_errors: c.transport_errors.load(Ordering::Relaxed),
            queue_evictions: c.queue_evictions.load(Ordering::Relaxed),
            connection_lost: c.connection_lost.load(Ordering::Acquire),
        }
    }
}

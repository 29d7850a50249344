//! # Message Queues
//!
//! The only state shared between the monitor and its relay worker. Both
//! variants bound their length at `capacity` and evict the oldest entry to
//! admit a new one; neither `put` nor `get` ever blocks the caller.
//!
//! - [`BoundedQueue`]: shared memory, for a worker thread
//! - [`IpcQueue`]: socket pair plus pump threads, for a forked worker

use crate::RelayResult;
use relay_config::ProcessType;
use std::sync::Arc;
use tokio::sync::Notify;
use types::StateMessage;

pub mod bounded;
#[cfg(unix)]
pub mod ipc;

pub use bounded::BoundedQueue;
#[cfg(unix)]
pub use ipc::IpcQueue;

/// Which side of the queue a unit of execution uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Calls `put_overflow_aware`
    Producer,
    /// Calls `try_get`
    Consumer,
}

/// Bounded drop-oldest queue of state messages
pub trait MessageQueue: Send + Sync {
    /// Enqueue at the tail, evicting and returning the head when full
    fn put_overflow_aware(&self, message: StateMessage) -> Option<StateMessage>;

    /// Dequeue the head without blocking
    fn try_get(&self) -> Option<StateMessage>;

    fn len(&self) -> usize;

    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notified whenever a message becomes available to the consumer
    fn notifier(&self) -> Arc<Notify>;

    /// Called once by each side from the unit of execution that will use it
    fn attach(&self, _endpoint: Endpoint) -> RelayResult<()> {
        Ok(())
    }

    /// Release background resources; later puts may be discarded
    fn close(&self) {}
}

/// Queue variant matching the worker's concurrency unit
pub fn queue_for(process_type: ProcessType, capacity: usize) -> RelayResult<Arc<dyn MessageQueue>> {
    match process_type {
        ProcessType::Thread => Ok(Arc::new(BoundedQueue::<StateMessage>::new(capacity))),
        #[cfg(unix)]
        ProcessType::Process => Ok(Arc::new(IpcQueue::new(capacity)?)),
        #[cfg(not(unix))]
        ProcessType::Process => Err(crate::RelayError::Unsupported {
            feature: "process-based relay worker",
        }),
    }
}

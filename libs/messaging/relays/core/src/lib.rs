//! # State Relay Core
//!
//! The moving parts behind a state monitor: the bounded queues shared with
//! the caller, the relay worker loop, and the spawners that run that loop
//! on a thread or in a child process.

pub mod error;
pub mod queue;
pub mod spawner;
pub mod stats;
pub mod worker;

pub use error::{RelayError, RelayResult};
pub use queue::{queue_for, BoundedQueue, Endpoint, MessageQueue};
#[cfg(unix)]
pub use queue::IpcQueue;
#[cfg(unix)]
pub use spawner::ProcessSpawner;
pub use spawner::{spawner_for, RelaySpawner, ThreadSpawner, WorkerHandle};
pub use stats::{RelayStats, RelayStatsSnapshot};
pub use worker::{run_relay, Direction, RelayJob};

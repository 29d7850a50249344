//! # Worker Spawners
//!
//! One abstraction, "run this relay job somewhere else", with a thread and
//! a process backing. The queue variant must match the spawner; see
//! [`crate::queue::queue_for`].

use crate::worker::RelayJob;
use crate::RelayResult;
use relay_config::ProcessType;

#[cfg(unix)]
mod process;
mod thread;

#[cfg(unix)]
pub use process::ProcessSpawner;
pub use thread::ThreadSpawner;

/// Running worker owned by the monitor
pub trait WorkerHandle: Send {
    /// Signal shutdown and wait for the worker to exit
    fn stop(&mut self) -> RelayResult<()>;

    /// True once the worker has exited, for any reason
    fn is_finished(&self) -> bool;
}

/// Starts relay workers
pub trait RelaySpawner: Send + Sync {
    fn spawn(&self, job: RelayJob) -> RelayResult<Box<dyn WorkerHandle>>;

    fn name(&self) -> &'static str;
}

/// Spawner matching the configured concurrency unit
pub fn spawner_for(process_type: ProcessType) -> RelayResult<Box<dyn RelaySpawner>> {
    match process_type {
        ProcessType::Thread => Ok(Box::new(ThreadSpawner::default())),
        #[cfg(unix)]
        ProcessType::Process => Ok(Box::new(ProcessSpawner)),
        #[cfg(not(unix))]
        ProcessType::Process => Err(crate::RelayError::Unsupported {
            feature: "process-based relay worker",
        }),
    }
}

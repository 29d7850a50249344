use super::{RelaySpawner, WorkerHandle};
use crate::worker::{run_relay, RelayJob};
use crate::{RelayError, RelayResult};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Runs the worker in a forked child process
///
/// The queue must be an IPC queue created before the fork. Counters in
/// [`crate::RelayStats`] live in the child and are not visible here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSpawner;

impl RelaySpawner for ProcessSpawner {
    fn spawn(&self, job: RelayJob) -> RelayResult<Box<dyn WorkerHandle>> {
        // SAFETY: the child only runs the relay on fresh threads and a fresh
        // runtime, then exits without returning into the parent's stack.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let code = run_child(job);
                std::process::exit(code);
            }
            Ok(ForkResult::Parent { child }) => {
                // The child owns the connection from here on
                drop(job);
                info!(pid = child.as_raw(), "Spawned relay worker process");
                Ok(Box::new(ProcessWorker {
                    pid: child,
                    reaped: AtomicBool::new(false),
                }))
            }
            Err(errno) => Err(RelayError::spawn(format!("fork failed: {errno}"))),
        }
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

fn run_child(job: RelayJob) -> i32 {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(error = %e, "Relay worker process could not build a runtime");
            return 1;
        }
    };
    match runtime.block_on(run_relay(job)) {
        Ok(()) => 0,
        Err(e) => {
            warn!(error = %e, "Relay worker process failed");
            1
        }
    }
}

struct ProcessWorker {
    pid: Pid,
    reaped: AtomicBool,
}

impl ProcessWorker {
    fn record(&self, status: WaitStatus) -> bool {
        match status {
            WaitStatus::StillAlive => false,
            status => {
                debug!(pid = self.pid.as_raw(), ?status, "Relay worker process exited");
                self.reaped.store(true, Ordering::Release);
                true
            }
        }
    }
}

impl WorkerHandle for ProcessWorker {
    fn stop(&mut self) -> RelayResult<()> {
        if self.reaped.load(Ordering::Acquire) {
            return Ok(());
        }

        match kill(self.pid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) => return Err(RelayError::spawn(format!("failed to signal worker: {errno}"))),
        }

        match waitpid(self.pid, None) {
            Ok(status) => {
                self.record(status);
                Ok(())
            }
            Err(Errno::ECHILD) => {
                self.reaped.store(true, Ordering::Release);
                Ok(())
            }
            Err(errno) => Err(RelayError::spawn(format!("failed to reap worker: {errno}"))),
        }
    }

    fn is_finished(&self) -> bool {
        if self.reaped.load(Ordering::Acquire) {
            return true;
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => self.record(status),
            Err(_) => true,
        }
    }
}

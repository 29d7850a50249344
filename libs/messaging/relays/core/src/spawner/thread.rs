use super::{RelaySpawner, WorkerHandle};
use crate::worker::{run_relay, RelayJob};
use crate::{RelayError, RelayResult};
use network::ShutdownHandle;
use std::net::{Shutdown, TcpStream};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Runs the worker on a dedicated OS thread with its own current-thread runtime
#[derive(Debug, Clone)]
pub struct ThreadSpawner {
    thread_name: String,
}

impl ThreadSpawner {
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
        }
    }
}

impl Default for ThreadSpawner {
    fn default() -> Self {
        Self::new("state-relay")
    }
}

impl RelaySpawner for ThreadSpawner {
    fn spawn(&self, job: RelayJob) -> RelayResult<Box<dyn WorkerHandle>> {
        let shutdown = job.shutdown.clone();
        let socket = job.stream.stream.try_clone()?;
        let name = format!("{}-{}", self.thread_name, job.direction);

        let join = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || -> RelayResult<()> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(run_relay(job))
            })
            .map_err(|e| RelayError::spawn(format!("thread {name}: {e}")))?;

        debug!(thread = %name, "Spawned relay worker thread");
        Ok(Box::new(ThreadWorker {
            join: Some(join),
            socket: Some(socket),
            shutdown,
        }))
    }

    fn name(&self) -> &'static str {
        "thread"
    }
}

struct ThreadWorker {
    join: Option<JoinHandle<RelayResult<()>>>,
    socket: Option<TcpStream>,
    shutdown: ShutdownHandle,
}

impl WorkerHandle for ThreadWorker {
    fn stop(&mut self) -> RelayResult<()> {
        self.shutdown.trigger();
        if let Some(socket) = self.socket.take() {
            if let Err(e) = socket.shutdown(Shutdown::Both) {
                debug!("Socket already shut down: {}", e);
            }
        }

        match self.join.take() {
            Some(join) => match join.join() {
                Ok(result) => result,
                Err(_) => {
                    warn!("Relay worker thread panicked");
                    Err(RelayError::WorkerPanicked)
                }
            },
            None => Ok(()),
        }
    }

    fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }
}

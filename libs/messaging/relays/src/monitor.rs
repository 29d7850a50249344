//! Monitor facade
//!
//! Owns role selection, the queue, the one-shot connector and the worker
//! lifecycle. `Created → Running → Stopped`, where `start()` is the only
//! blocking call.

use crate::{MonitorError, Result};
use network::{
    default_print_callback, EstablishedStream, PrintCallback, ShutdownHandle, ShutdownSignal,
    StatusSink, TcpConnector, TransportError,
};
use relay_config::{Mode, MonitorConfig};
use relay_core::{
    queue_for, spawner_for, Direction, MessageQueue, RelayJob, RelayStats, RelayStatsSnapshot,
    WorkerHandle,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::StateMessage;

/// Status line emitted once the worker is running
pub const RUNNING_MESSAGE: &str = "Monitor permanently running...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Created,
    Running,
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MonitorState::Created => "created",
            MonitorState::Running => "running",
            MonitorState::Stopped => "stopped",
        })
    }
}

/// One end of a state relay
pub struct StateMonitor {
    config: MonitorConfig,
    print_callback: PrintCallback,
    queue: Arc<dyn MessageQueue>,
    stats: RelayStats,
    shutdown: ShutdownHandle,
    state: MonitorState,
    worker: Option<Box<dyn WorkerHandle>>,
}

impl StateMonitor {
    /// Validate the config and create the queue; no I/O happens here
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let queue = queue_for(config.process_type, config.limits.queue_capacity)?;
        let (shutdown, _) = network::shutdown_channel();

        debug!(
            mode = %config.mode,
            process_type = %config.process_type,
            capacity = config.limits.queue_capacity,
            "Created state monitor"
        );

        Ok(Self {
            config,
            print_callback: default_print_callback(),
            queue,
            stats: RelayStats::new(),
            shutdown,
            state: MonitorState::Created,
            worker: None,
        })
    }

    /// Replace the `(message, verbose)` status callback
    pub fn with_print_callback(mut self, callback: PrintCallback) -> Self {
        self.print_callback = callback;
        self
    }

    /// Connect (client) or accept one peer (host), then start the relay worker
    ///
    /// Blocks until the connection is established or the shutdown handle
    /// fires. A cancelled start leaves the monitor `Stopped`; other
    /// connection failures leave it `Created` so the call can be retried.
    /// Safe to call from inside a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            MonitorState::Running => return Err(MonitorError::AlreadyStarted),
            MonitorState::Stopped => return Err(MonitorError::Stopped),
            MonitorState::Created => {}
        }

        let status = self.status_sink();
        let connector = TcpConnector::new(self.config.host.clone(), self.config.port, status.clone())
            .with_backlog(self.config.listen_backlog);
        let established = match establish(connector, self.config.mode, self.shutdown.signal()) {
            Ok(established) => established,
            Err(e @ TransportError::Cancelled { .. }) => {
                debug!(mode = %self.config.mode, "Start cancelled by shutdown");
                self.state = MonitorState::Stopped;
                self.queue.close();
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        let peer = established.peer_addr;

        let direction = Direction::from(self.config.mode);
        let job = RelayJob {
            direction,
            stream: established,
            queue: Arc::clone(&self.queue),
            limits: self.config.limits.clone(),
            stats: self.stats.clone(),
            shutdown: self.shutdown.clone(),
        };

        let spawner = spawner_for(self.config.process_type)?;
        let mut worker = spawner.spawn(job)?;
        if let Err(e) = self.queue.attach(direction.facade_endpoint()) {
            if let Err(stop_err) = worker.stop() {
                warn!(error = %stop_err, "Failed to stop worker after attach failure");
            }
            return Err(e.into());
        }

        self.worker = Some(worker);
        self.state = MonitorState::Running;

        info!(
            mode = %self.config.mode,
            %peer,
            worker = spawner.name(),
            "State monitor running"
        );
        status.emit(RUNNING_MESSAGE);
        Ok(())
    }

    /// Next received message, or `None` when nothing is queued; host only
    pub fn get(&self) -> Result<Option<StateMessage>> {
        self.check(Mode::Host, "get")?;
        Ok(self.queue.try_get())
    }

    /// Queue a message for sending, evicting the oldest when full; client only
    pub fn put(&self, message: StateMessage) -> Result<()> {
        self.check(Mode::Client, "put")?;
        if self.queue.put_overflow_aware(message).is_some() {
            self.stats.record_eviction();
        }
        Ok(())
    }

    /// Stop the worker and release the queue; idempotent
    pub fn end(&mut self) -> Result<()> {
        if self.state == MonitorState::Stopped {
            return Ok(());
        }
        let was = self.state;
        self.state = MonitorState::Stopped;
        self.shutdown.trigger();

        let stopped = match self.worker.take() {
            Some(mut worker) => worker.stop(),
            None => Ok(()),
        };
        self.queue.close();

        if was == MonitorState::Running {
            info!(mode = %self.config.mode, "State monitor stopped");
        }
        stopped.map_err(MonitorError::from)
    }

    /// Handle that interrupts a blocked `start()` or stops a running worker
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Worker counters; in process mode these stay at zero
    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.state == MonitorState::Running
    }

    /// True while running and the worker has not exited
    pub fn is_relaying(&self) -> bool {
        self.is_running() && self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn check(&self, required: Mode, operation: &'static str) -> Result<()> {
        if self.config.mode != required {
            return Err(MonitorError::RoleMismatch {
                operation,
                mode: self.config.mode,
            });
        }
        match self.state {
            MonitorState::Running => Ok(()),
            MonitorState::Created => Err(MonitorError::NotStarted),
            MonitorState::Stopped => Err(MonitorError::Stopped),
        }
    }

    fn status_sink(&self) -> StatusSink {
        StatusSink::new(Arc::clone(&self.print_callback), self.config.verbose)
    }
}

impl Drop for StateMonitor {
    fn drop(&mut self) {
        if let Err(e) = self.end() {
            warn!(error = %e, "Error while stopping state monitor");
        }
    }
}

impl fmt::Debug for StateMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMonitor")
            .field("mode", &self.config.mode)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Run the connector on a private current-thread runtime
///
/// When the caller is already inside a runtime, the connector runs on a
/// scoped thread so `block_on` is never nested.
fn establish(
    connector: TcpConnector,
    mode: Mode,
    mut signal: ShutdownSignal,
) -> std::result::Result<EstablishedStream, TransportError> {
    let mut run = move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::network_with_source("Failed to build connector runtime", e))?;
        runtime.block_on(async {
            match mode {
                Mode::Host => connector.accept_one(&mut signal).await,
                Mode::Client => connector.connect(&mut signal).await,
            }
        })
    };

    if tokio::runtime::Handle::try_current().is_err() {
        return run();
    }
    std::thread::scope(|scope| match scope.spawn(run).join() {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    })
}

//! State monitor binary - one end of a host/client state relay
//!
//! Usage:
//!   state-monitor --mode host --port 9999
//!   state-monitor --mode client --host 127.0.0.1 --port 9999 --interval-ms 100
//!   state-monitor --config config/monitor.toml

use anyhow::{Context, Result};
use clap::Parser;
use state_relay::{
    Framing, Mode, MonitorConfig, ProcessType, ShutdownHandle, StateMessage, StateMonitor, Tensor,
    Value,
};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "state-monitor")]
#[command(about = "Relay state messages between a host and a client over TCP")]
#[command(version)]
struct Args {
    /// Path to a TOML config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Side of the connection (host, client)
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Address to listen on (host) or connect to (client)
    #[arg(long)]
    host: Option<String>,

    /// TCP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Print connection milestones
    #[arg(short, long)]
    verbose: bool,

    /// Worker concurrency unit (thread, process)
    #[arg(long)]
    process_type: Option<ProcessType>,

    /// Wire framing (length-prefixed, single-read)
    #[arg(long)]
    framing: Option<Framing>,

    /// Poll (host) or publish (client) interval in milliseconds
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = build_config(&args)?;
    info!(
        mode = %config.mode,
        host = %config.host,
        port = config.port,
        process_type = %config.process_type,
        framing = %config.limits.framing,
        "Starting state monitor"
    );

    let mut monitor = StateMonitor::new(config)?;
    spawn_signal_watcher(monitor.shutdown_handle())?;

    if let Err(e) = monitor.start() {
        if e.is_cancelled() {
            info!("Interrupted before a peer connected");
            return Ok(());
        }
        error!(error = %e, "Failed to start state monitor");
        return Err(e.into());
    }

    let shutdown = monitor.shutdown_handle();
    let interval = Duration::from_millis(args.interval_ms.max(1));
    match monitor.mode() {
        Mode::Host => run_host(&monitor, &shutdown, interval)?,
        Mode::Client => run_client(&monitor, &shutdown, interval)?,
    }

    let stats = monitor.stats();
    monitor.end()?;
    info!(
        relayed = stats.messages_relayed,
        bytes = stats.bytes_relayed,
        decode_failures = stats.decode_failures,
        oversized = stats.oversized_dropped,
        evictions = stats.queue_evictions,
        "State monitor finished"
    );
    Ok(())
}

fn run_host(monitor: &StateMonitor, shutdown: &ShutdownHandle, interval: Duration) -> Result<()> {
    while !shutdown.is_triggered() {
        match monitor.get()? {
            Some(message) => info!("{}", summarize(&message)),
            None if !monitor.is_relaying() => {
                warn!("Relay worker exited, stopping");
                break;
            }
            None => std::thread::sleep(interval),
        }
    }
    Ok(())
}

fn run_client(monitor: &StateMonitor, shutdown: &ShutdownHandle, interval: Duration) -> Result<()> {
    let mut counter: i64 = 0;
    while !shutdown.is_triggered() {
        if !monitor.is_relaying() {
            warn!("Relay worker exited, stopping");
            break;
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let phase = counter as f32;
        let pose = Tensor::from_slice(vec![2, 2], &[phase, phase + 1.0, phase + 2.0, phase + 3.0])?;
        let message = StateMessage::new()
            .with("counter", counter)?
            .with("timestamp", timestamp)?
            .with("pose", pose)?;

        monitor.put(message)?;
        counter += 1;
        std::thread::sleep(interval);
    }
    Ok(())
}

fn summarize(message: &StateMessage) -> String {
    let fields: Vec<String> = message
        .iter()
        .map(|(key, value)| match value {
            Value::Tensor(t) => format!("{key}=<{} {:?}>", t.dtype(), t.shape()),
            other => format!("{key}={other:?}"),
        })
        .collect();
    format!("received {{{}}}", fields.join(", "))
}

fn build_config(args: &Args) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let mode = args.mode.context("--mode is required without --config")?;
            let port = args.port.context("--port is required without --config")?;
            MonitorConfig::new(mode, "127.0.0.1", port)
        }
    };

    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(process_type) = args.process_type {
        config.process_type = process_type;
    }
    if let Some(framing) = args.framing {
        config.limits.framing = framing;
    }
    config.verbose |= args.verbose;

    config.validate()?;
    Ok(config)
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;

    if args.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    Ok(())
}

/// Trigger the monitor's shutdown on Ctrl+C
fn spawn_signal_watcher(shutdown: ShutdownHandle) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    std::thread::Builder::new()
        .name("signal-watcher".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Received shutdown signal");
                        shutdown.trigger();
                    }
                    Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
                }
            });
        })
        .context("failed to start signal watcher")?;

    Ok(())
}

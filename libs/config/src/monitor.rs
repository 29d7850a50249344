//! Monitor configuration
//!
//! Loaded from a TOML file with environment overrides, or built in code.

use crate::limits::RelayLimits;
use crate::{ConfigError, Result};
use config::{Config, Environment, File, FileFormat};
use network::DEFAULT_LISTEN_BACKLOG;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "STATE_MONITOR";

/// Which side of the connection this monitor is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Mode {
    /// Accepts the connection and receives messages
    Host,
    /// Connects to the host and sends messages
    Client,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Host => "host",
            Mode::Client => "client",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(Mode::Host),
            "client" => Ok(Mode::Client),
            _ => Err(ConfigError::UnknownMode {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.as_str().to_string()
    }
}

/// Concurrency unit that runs the relay worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProcessType {
    /// Dedicated OS thread sharing the monitor's memory
    #[default]
    Thread,
    /// Forked child process talking to the monitor over a socket pair
    Process,
}

impl ProcessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessType::Thread => "thread",
            ProcessType::Process => "process",
        }
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(ProcessType::Thread),
            "process" => Ok(ProcessType::Process),
            _ => Err(ConfigError::UnknownProcessType {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ProcessType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProcessType> for String {
    fn from(process_type: ProcessType) -> Self {
        process_type.as_str().to_string()
    }
}

/// Full monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub mode: Mode,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub process_type: ProcessType,
    #[serde(default = "default_listen_backlog")]
    pub listen_backlog: u32,
    #[serde(default)]
    pub limits: RelayLimits,
}

fn default_listen_backlog() -> u32 {
    DEFAULT_LISTEN_BACKLOG
}

impl MonitorConfig {
    /// Config with default limits, thread worker and quiet output
    pub fn new(mode: Mode, host: impl Into<String>, port: u16) -> Self {
        Self {
            mode,
            host: host.into(),
            port,
            verbose: false,
            process_type: ProcessType::default(),
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
            limits: RelayLimits::default(),
        }
    }

    pub fn host(host: impl Into<String>, port: u16) -> Self {
        Self::new(Mode::Host, host, port)
    }

    pub fn client(host: impl Into<String>, port: u16) -> Self {
        Self::new(Mode::Client, host, port)
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_process_type(mut self, process_type: ProcessType) -> Self {
        self.process_type = process_type;
        self
    }

    pub fn with_limits(mut self, limits: RelayLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Load a TOML file, then apply `STATE_MONITOR__*` environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`MonitorConfig::load`] but with an explicit environment map
    pub fn load_with_env<P: AsRef<Path>>(
        path: P,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading monitor config: {:?}", path);

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        debug!(mode = %config.mode, host = %config.host, port = config.port, "Monitor config loaded");
        Ok(config)
    }

    /// Parse TOML text without environment overrides
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;

        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("host", "must not be empty"));
        }

        if self.mode == Mode::Client && self.port == 0 {
            return Err(ConfigError::invalid("port", "client needs a concrete port"));
        }

        if self.listen_backlog == 0 {
            return Err(ConfigError::invalid("listen_backlog", "must be > 0"));
        }

        Ok(())
    }
}

//! Configuration data model

use std::path::PathBuf;
use std::time::Duration;

/// Default location of the configuration file, before tilde expansion
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/fht-mirror/config.kdl";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub global: GlobalConfig,
}

/// Global settings
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
    /// Environment variable holding the socket path, if not the compositor's own
    pub socket_env: Option<String>,
    /// Explicit socket path, taking precedence over `socket_env`
    pub socket_path: Option<PathBuf>,
    /// Delay after each processed event line, in milliseconds
    pub pacing_ms: u64,
    /// How long snapshot commands wait for the first state event
    pub initial_state_timeout_ms: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            socket_env: None,
            socket_path: None,
            pacing_ms: 1,
            initial_state_timeout_ms: 500,
        }
    }
}

impl GlobalConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn initial_state_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_state_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

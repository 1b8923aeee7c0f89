//! Command-line and environment configuration.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use console_bridge_core::LogStoreConfig;
use console_bridge_transport::ConnectionConfig;

/// Browser console bridge.
#[derive(Debug, Clone, Parser)]
#[command(name = "console-bridge", version, about, long_about = None)]
pub struct Config {
    /// Address to bind
    #[arg(long, env = "CONSOLE_BRIDGE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port for the agent WebSocket and the query API
    #[arg(short, long, env = "CONSOLE_BRIDGE_PORT", default_value_t = 3333)]
    pub port: u16,

    /// Maximum number of retained log entries
    #[arg(long, env = "CONSOLE_BRIDGE_MAX_LOGS", default_value_t = 10_000)]
    pub max_logs: usize,

    /// Seconds between liveness probes
    #[arg(long, env = "CONSOLE_BRIDGE_HEARTBEAT_SECS", default_value_t = 30)]
    pub heartbeat_secs: u64,

    /// Default wait for a remote command reply, in milliseconds
    #[arg(long, env = "CONSOLE_BRIDGE_COMMAND_TIMEOUT_MS", default_value_t = 5000)]
    pub command_timeout_ms: u64,

    /// Project directory used for tab suggestions (defaults to the current directory)
    #[arg(long, env = "CONSOLE_BRIDGE_WORKDIR")]
    pub workdir: Option<PathBuf>,
}

impl Config {
    #[must_use]
    pub const fn log_store(&self) -> LogStoreConfig {
        LogStoreConfig {
            capacity: self.max_logs,
        }
    }

    #[must_use]
    pub const fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
        }
    }

    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Configured working directory, or the process's current one.
    #[must_use]
    pub fn working_dir(&self) -> PathBuf {
        self.workdir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

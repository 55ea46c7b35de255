//! Configuration for the worker agent.

use std::time::Duration;

use anyhow::Result;

/// Which container runtime backs the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Docker,
    /// In-memory mock, for development and tests.
    Mock,
}

/// Worker agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the agent API listens on.
    pub listen_addr: String,

    /// Container runtime backend.
    pub runtime: RuntimeKind,

    /// Interval between executor ticks (start queued work, refresh
    /// container states).
    pub tick_interval: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr =
            std::env::var("DROVER_WORKER_LISTEN").unwrap_or_else(|_| "0.0.0.0:5556".to_string());

        let runtime = match std::env::var("DROVER_WORKER_RUNTIME").as_deref() {
            Ok("mock") => RuntimeKind::Mock,
            Ok("docker") | Err(_) => RuntimeKind::Docker,
            Ok(other) => anyhow::bail!("unknown runtime {other:?} (expected docker or mock)"),
        };

        let tick_interval = std::env::var("DROVER_WORKER_TICK_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(500));

        let log_level = std::env::var("DROVER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            listen_addr,
            runtime,
            tick_interval,
            log_level,
        })
    }
}

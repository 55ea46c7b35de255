//! Configuration for the manager.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::scheduler::SchedulerKind;

/// Which backend holds the task and event stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite,
}

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the control API listens on.
    pub listen_addr: String,

    /// Workers known at startup; more can be added via the API.
    pub workers: Vec<String>,

    /// Scheduling strategy, fixed for the manager's lifetime.
    pub scheduler: SchedulerKind,

    /// Store backend for tasks and events.
    pub store: StoreKind,

    /// Database path for the sqlite backend.
    pub db_path: PathBuf,

    /// Polling interval of the dispatch loop when the queue is empty.
    pub dispatch_interval: Duration,

    /// Interval between status-sync passes.
    pub sync_interval: Duration,

    /// Interval between health-check passes.
    pub health_interval: Duration,

    /// Timeout for every worker call.
    pub worker_timeout: Duration,

    /// Worker-communication failures tolerated per dispatch.
    pub dispatch_max_attempts: u32,

    /// Restart-count cap for health-check-driven restarts.
    pub max_restarts: u32,

    /// Consecutive status-sync misses before a task is considered lost.
    pub lost_task_grace_ticks: u32,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr =
            std::env::var("DROVER_MANAGER_LISTEN").unwrap_or_else(|_| "0.0.0.0:5555".to_string());

        let workers = std::env::var("DROVER_WORKERS")
            .map(|csv| {
                csv.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let scheduler = std::env::var("DROVER_SCHEDULER")
            .unwrap_or_else(|_| "epvm".to_string())
            .parse::<SchedulerKind>()
            .map_err(|e| anyhow::anyhow!(e))?;

        let store = match std::env::var("DROVER_STORE").as_deref() {
            Ok("sqlite") => StoreKind::Sqlite,
            Ok("memory") | Err(_) => StoreKind::Memory,
            Ok(other) => anyhow::bail!("unknown store {other:?} (expected memory or sqlite)"),
        };

        let db_path = std::env::var("DROVER_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("drover.db"));

        Ok(Self {
            listen_addr,
            workers,
            scheduler,
            store,
            db_path,
            dispatch_interval: env_duration_ms("DROVER_DISPATCH_INTERVAL_MS", 1_000),
            sync_interval: env_duration_ms("DROVER_SYNC_INTERVAL_MS", 10_000),
            health_interval: env_duration_ms("DROVER_HEALTH_INTERVAL_MS", 30_000),
            worker_timeout: env_duration_ms("DROVER_WORKER_TIMEOUT_MS", 5_000),
            dispatch_max_attempts: env_u32("DROVER_DISPATCH_MAX_ATTEMPTS", 3),
            max_restarts: env_u32("DROVER_MAX_RESTARTS", 3),
            lost_task_grace_ticks: env_u32("DROVER_LOST_TASK_GRACE_TICKS", 2),
            log_level: std::env::var("DROVER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn env_duration_ms(name: &str, default: u64) -> Duration {
    let ms = std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default);
    Duration::from_millis(ms)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

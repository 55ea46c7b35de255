//! Scheduling strategies: pick a worker for a pending task.
//!
//! A scheduler is a pure function of the task and the current worker
//! snapshot (round-robin additionally keeps a cursor, mutated atomically
//! so concurrent dispatch is safe). The variant is chosen at manager
//! construction and fixed for the manager's lifetime.

mod epvm;
mod greedy;
mod round_robin;

pub use epvm::Epvm;
pub use greedy::Greedy;
pub use round_robin::RoundRobin;

use std::str::FromStr;

use uuid::Uuid;

use drover_task::Task;

use crate::client::WorkerStats;

/// A worker as seen by the scheduler: its address plus, when the
/// variant asked for them, its load stats. `stats` is `None` when the
/// worker was unreachable this tick.
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub addr: String,
    pub stats: Option<WorkerStats>,
}

/// Errors from worker selection.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// No worker qualifies for this task.
    #[error("no eligible worker for task {0}")]
    NoEligibleWorker(Uuid),
}

/// Strategy object mapping a pending task and the candidate worker set
/// to exactly one selected worker address.
pub trait Scheduler: Send + Sync {
    /// Whether `select` reads worker load stats. When false the
    /// dispatch loop skips the per-worker stats queries.
    fn needs_stats(&self) -> bool {
        false
    }

    /// Pick a worker for `task`, or fail if none qualify.
    fn select(&self, task: &Task, workers: &[WorkerSnapshot]) -> Result<String, SchedulerError>;
}

/// Scheduler variant names accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    RoundRobin,
    Greedy,
    Epvm,
}

impl SchedulerKind {
    /// Construct the scheduler for this variant.
    pub fn build(self) -> Box<dyn Scheduler> {
        match self {
            SchedulerKind::RoundRobin => Box::new(RoundRobin::new()),
            SchedulerKind::Greedy => Box::new(Greedy),
            SchedulerKind::Epvm => Box::new(Epvm),
        }
    }
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "roundrobin" => Ok(SchedulerKind::RoundRobin),
            "greedy" => Ok(SchedulerKind::Greedy),
            "epvm" => Ok(SchedulerKind::Epvm),
            other => Err(format!(
                "unknown scheduler {other:?} (expected roundrobin, greedy, or epvm)"
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use drover_task::TaskSpec;

    pub fn task(cpu: f64, memory: u64, disk: u64) -> Task {
        Task::from_spec(TaskSpec {
            name: "web".to_string(),
            image: "nginx:latest".to_string(),
            cpu,
            memory,
            disk,
            exposed_ports: vec![],
            env: vec![],
            restart_policy: Default::default(),
            health_check: None,
        })
    }

    pub fn snapshot(addr: &str, stats: Option<WorkerStats>) -> WorkerSnapshot {
        WorkerSnapshot {
            addr: addr.to_string(),
            stats,
        }
    }

    pub fn stats(task_count: usize, memory_available: u64) -> WorkerStats {
        WorkerStats {
            task_count,
            cpu_total: 8.0,
            cpu_usage: 0.0,
            memory_total: 16 * 1024 * 1024 * 1024,
            memory_available,
            disk_total: 100 * 1024 * 1024 * 1024,
            disk_available: 50 * 1024 * 1024 * 1024,
        }
    }
}

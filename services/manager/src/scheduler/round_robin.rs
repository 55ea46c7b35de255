//! Round-robin scheduling: cycle through the worker list in order.

use std::sync::atomic::{AtomicUsize, Ordering};

use drover_task::Task;

use super::{Scheduler, SchedulerError, WorkerSnapshot};

/// Cycles through the worker list with a monotonic cursor shared across
/// calls. Ignores load entirely; deterministic and starvation-free.
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for RoundRobin {
    fn select(&self, task: &Task, workers: &[WorkerSnapshot]) -> Result<String, SchedulerError> {
        if workers.is_empty() {
            return Err(SchedulerError::NoEligibleWorker(task.id));
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % workers.len();
        Ok(workers[index].addr.clone())
    }
}

//! Greedy scheduling: pick the least-loaded worker.

use drover_task::Task;

use super::{Scheduler, SchedulerError, WorkerSnapshot};

/// Picks the worker with the lowest resident task count, tie-broken by
/// list order. Workers without a load snapshot (unreachable this tick)
/// are not eligible.
pub struct Greedy;

impl Scheduler for Greedy {
    fn needs_stats(&self) -> bool {
        true
    }

    fn select(&self, task: &Task, workers: &[WorkerSnapshot]) -> Result<String, SchedulerError> {
        let mut best: Option<(&WorkerSnapshot, usize)> = None;

        for worker in workers {
            let Some(stats) = &worker.stats else {
                continue;
            };

            match best {
                Some((_, count)) if stats.task_count >= count => {}
                _ => best = Some((worker, stats.task_count)),
            }
        }

        best.map(|(w, _)| w.addr.clone())
            .ok_or(SchedulerError::NoEligibleWorker(task.id))
    }
}

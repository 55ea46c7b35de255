//! Resource-fit ("epvm") scheduling: bin-pack onto the tightest worker.

use drover_task::Task;

use crate::client::WorkerStats;

use super::{Scheduler, SchedulerError, WorkerSnapshot};

/// Filters out workers that cannot satisfy the task's cpu/memory/disk
/// request against their remaining capacity, then scores the rest by
/// [`leftover_fraction`] — lower leftover wins, so tasks pack tightly.
/// Ties break to list order.
pub struct Epvm;

impl Scheduler for Epvm {
    fn needs_stats(&self) -> bool {
        true
    }

    fn select(&self, task: &Task, workers: &[WorkerSnapshot]) -> Result<String, SchedulerError> {
        let mut best: Option<(&WorkerSnapshot, f64)> = None;

        for worker in workers {
            let Some(stats) = &worker.stats else {
                continue;
            };
            if !fits(task, stats) {
                continue;
            }

            let score = leftover_fraction(task, stats);
            match best {
                Some((_, current)) if score >= current => {}
                _ => best = Some((worker, score)),
            }
        }

        best.map(|(w, _)| w.addr.clone())
            .ok_or(SchedulerError::NoEligibleWorker(task.id))
    }
}

/// Whether the worker's remaining capacity covers the task's request.
fn fits(task: &Task, stats: &WorkerStats) -> bool {
    cpu_available(stats) >= task.cpu
        && stats.memory_available >= task.memory
        && stats.disk_available >= task.disk
}

fn cpu_available(stats: &WorkerStats) -> f64 {
    let used = stats.cpu_total * (stats.cpu_usage / 100.0);
    (stats.cpu_total - used).max(0.0)
}

/// Scoring policy: the fraction of capacity left after placing the
/// task, averaged over cpu and memory. Pure; changing the packing
/// policy means changing only this function.
fn leftover_fraction(task: &Task, stats: &WorkerStats) -> f64 {
    let cpu_left = (cpu_available(stats) - task.cpu) / stats.cpu_total.max(1.0);
    let memory_left =
        (stats.memory_available.saturating_sub(task.memory)) as f64 / stats.memory_total.max(1) as f64;

    (cpu_left + memory_left) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::testutil::{snapshot, stats, task};

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn oversized_request_has_no_eligible_worker() {
        let workers = vec![
            snapshot("w1:5556", Some(stats(0, 2 * GIB))),
            snapshot("w2:5556", Some(stats(0, 4 * GIB))),
        ];

        // Asks for more memory than any worker has free.
        let big = task(1.0, 8 * GIB, 0);
        assert!(matches!(
            Epvm.select(&big, &workers),
            Err(SchedulerError::NoEligibleWorker(_))
        ));
    }

    #[test]
    fn only_fitting_worker_is_always_chosen() {
        // w2 is the only worker with enough free memory; it must win
        // regardless of its load.
        let mut loaded = stats(9, 8 * GIB);
        loaded.cpu_usage = 50.0;

        let workers = vec![
            snapshot("w1:5556", Some(stats(0, 1 * GIB))),
            snapshot("w2:5556", Some(loaded)),
            snapshot("w3:5556", Some(stats(0, 2 * GIB))),
        ];

        let t = task(1.0, 4 * GIB, 0);
        for _ in 0..5 {
            assert_eq!(Epvm.select(&t, &workers).unwrap(), "w2:5556");
        }
    }

    #[test]
    fn prefers_the_tighter_fit() {
        // Both fit; the one left with less spare capacity wins.
        let roomy = stats(0, 12 * GIB);
        let snug = stats(0, 3 * GIB);

        let workers = vec![
            snapshot("roomy:5556", Some(roomy)),
            snapshot("snug:5556", Some(snug)),
        ];

        let t = task(0.5, 2 * GIB, 0);
        assert_eq!(Epvm.select(&t, &workers).unwrap(), "snug:5556");
    }

    #[test]
    fn cpu_capacity_is_respected() {
        let mut busy = stats(0, 8 * GIB);
        busy.cpu_usage = 95.0; // 8 cores, 0.4 cores free

        let workers = vec![snapshot("w1:5556", Some(busy))];
        assert!(matches!(
            Epvm.select(&task(1.0, 1 * GIB, 0), &workers),
            Err(SchedulerError::NoEligibleWorker(_))
        ));
    }

    #[test]
    fn disk_request_filters_workers() {
        let small_disk = WorkerStats {
            disk_available: 1 * GIB,
            ..stats(0, 8 * GIB)
        };

        let workers = vec![snapshot("w1:5556", Some(small_disk))];
        assert!(matches!(
            Epvm.select(&task(0.5, 1 * GIB, 10 * GIB), &workers),
            Err(SchedulerError::NoEligibleWorker(_))
        ));
    }
}

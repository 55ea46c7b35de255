//! Health-check loop: restart unhealthy running tasks, within policy.
//!
//! For every running task with a configured health check, the loop asks
//! the task's worker for liveness. A failure produces either a fresh
//! restart (a new task and event pushed onto the pending queue, feeding
//! the dispatch loop) or a terminal failure once policy or the restart
//! cap says no.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use drover_task::{State, Task, TaskEvent};

use crate::manager::Manager;

/// The health-check loop.
pub struct HealthCheckLoop {
    manager: Manager,
    interval: Duration,
}

impl HealthCheckLoop {
    pub fn new(manager: Manager, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Run until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting health-check loop"
        );

        let mut tick = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.check_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Health-check loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Probe every running task with a health check, once.
    pub async fn check_once(&self) {
        let tasks = match self.manager.tasks() {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Failed to list tasks");
                return;
            }
        };

        for task in tasks {
            if task.state != State::Running || task.health_check.is_none() {
                continue;
            }
            let Some(worker) = task.assigned_worker.clone() else {
                continue;
            };

            match self.manager.client().task_health(&worker, task.id).await {
                // A healthy task is a no-op.
                Ok(true) => {}
                Ok(false) => self.handle_unhealthy(task).await,
                Err(e) => {
                    warn!(
                        worker = %worker,
                        task_id = %task.id,
                        error = %e,
                        "Health check unreachable, skipping this tick"
                    );
                }
            }
        }
    }

    /// Fail the task and, if policy and the restart cap allow, enqueue
    /// a successor.
    async fn handle_unhealthy(&self, mut task: Task) {
        let max_restarts = self.manager.options().max_restarts;
        let restartable =
            task.restart_policy.permits_restart() && task.restart_count < max_restarts;

        warn!(
            task_id = %task.id,
            restart_count = task.restart_count,
            restartable,
            "Task failed its health check"
        );

        if let Err(e) = task.transition_to(State::Failed) {
            warn!(task_id = %task.id, error = %e, "Unhealthy task already settled");
            return;
        }
        if let Err(e) = self.manager.task_store().put(&task.id.to_string(), &task) {
            error!(task_id = %task.id, error = %e, "Failed to persist failed task");
            return;
        }

        if !restartable {
            if task.restart_policy.permits_restart() {
                error!(
                    task_id = %task.id,
                    restart_count = task.restart_count,
                    "Restart cap reached, task failed terminally"
                );
            }
            return;
        }

        // A restart is a new task record, never a resurrection: lineage
        // is carried by the restart count.
        let successor = task.restart_successor();
        let event = TaskEvent::new(State::Scheduled, successor.clone());

        if let Err(e) = self
            .manager
            .task_store()
            .put(&successor.id.to_string(), &successor)
        {
            error!(task_id = %successor.id, error = %e, "Failed to persist restart task");
            return;
        }
        if let Err(e) = self.manager.event_store().put(&event.id.to_string(), &event) {
            error!(task_id = %successor.id, error = %e, "Failed to append restart event");
            return;
        }
        self.manager.enqueue(event).await;

        info!(
            failed_task = %task.id,
            restart_task = %successor.id,
            restart_count = successor.restart_count,
            "Restart scheduled"
        );
    }
}

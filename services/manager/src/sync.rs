//! Status-sync loop: reconcile stored task state with worker reports.
//!
//! On each tick the loop asks every known worker for its resident task
//! list and folds what it observes into the task store: legal
//! transitions are committed with an observed event appended to the
//! log, illegal reports are rejected, and tasks a worker silently
//! dropped are marked failed after a grace period. This loop never
//! touches the pending queue — restarts are the health-check loop's
//! business.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use drover_task::{State, Task, TaskEvent};

use crate::manager::{Manager, ManagerError};

/// The status-sync loop.
pub struct StatusSyncLoop {
    manager: Manager,
    interval: Duration,

    /// Consecutive ticks a worker may fail to report an assigned task
    /// before it is considered lost.
    grace_ticks: u32,

    /// Miss counters per task. Loop-local observation bookkeeping, not
    /// cluster state.
    misses: HashMap<Uuid, u32>,
}

impl StatusSyncLoop {
    pub fn new(manager: Manager, interval: Duration, grace_ticks: u32) -> Self {
        Self {
            manager,
            interval,
            grace_ticks: grace_ticks.max(1),
            misses: HashMap::new(),
        }
    }

    /// Run until shutdown.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            grace_ticks = self.grace_ticks,
            "Starting status-sync loop"
        );

        let mut tick = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.sync_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Status-sync loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Perform a single reconciliation pass over all workers.
    pub async fn sync_once(&mut self) {
        for worker in self.manager.workers().await {
            let report = self.manager.client().list_tasks(&worker).await;
            match report {
                Ok(reported) => self.reconcile_worker(&worker, reported),
                Err(e) => {
                    // Skipped, not removed; retried next tick. No miss is
                    // charged for tasks we could not observe.
                    warn!(worker = %worker, error = %e, "Worker unreachable, skipping this tick");
                }
            }
        }
    }

    /// Fold one worker's report into the store.
    fn reconcile_worker(&mut self, worker: &str, reported: Vec<Task>) {
        let reported_ids: HashSet<Uuid> = reported.iter().map(|t| t.id).collect();

        for observed in reported {
            self.misses.remove(&observed.id);

            let stored = match self.manager.task(observed.id) {
                Ok(task) => task,
                Err(ManagerError::Store(e)) if e.is_not_found() => {
                    debug!(worker = %worker, task_id = %observed.id, "Worker reports unknown task");
                    continue;
                }
                Err(e) => {
                    error!(task_id = %observed.id, error = %e, "Failed to read task");
                    continue;
                }
            };

            self.apply_observation(worker, stored, observed);
        }

        self.detect_lost(worker, &reported_ids);
    }

    fn apply_observation(&self, worker: &str, stored: Task, observed: Task) {
        if stored.state == observed.state {
            // Nothing moved; just keep the container id current.
            if stored.container_id != observed.container_id {
                let mut updated = stored;
                updated.container_id = observed.container_id;
                if let Err(e) = self
                    .manager
                    .task_store()
                    .put(&updated.id.to_string(), &updated)
                {
                    error!(task_id = %updated.id, error = %e, "Failed to update task");
                }
            }
            return;
        }

        if !stored.state.can_transition_to(observed.state) {
            warn!(
                worker = %worker,
                task_id = %stored.id,
                stored = %stored.state,
                observed = %observed.state,
                "Ignoring illegal reported transition"
            );
            return;
        }

        let mut updated = stored;
        updated.state = observed.state;
        updated.container_id = observed.container_id;
        updated.start_time = observed.start_time;
        updated.finish_time = observed.finish_time;

        if let Err(e) = self
            .manager
            .task_store()
            .put(&updated.id.to_string(), &updated)
        {
            error!(task_id = %updated.id, error = %e, "Failed to update task");
            return;
        }

        // Record the observed transition in the audit log.
        let event = TaskEvent::new(updated.state, updated.clone());
        if let Err(e) = self.manager.event_store().put(&event.id.to_string(), &event) {
            error!(task_id = %updated.id, error = %e, "Failed to append event");
        }

        info!(
            worker = %worker,
            task_id = %updated.id,
            state = %updated.state,
            "Observed task transition"
        );
    }

    /// Mark tasks the worker should be running but no longer reports.
    fn detect_lost(&mut self, worker: &str, reported_ids: &HashSet<Uuid>) {
        let stored = match self.manager.tasks() {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Failed to list tasks");
                return;
            }
        };

        for mut task in stored {
            let assigned_here = task.assigned_worker.as_deref() == Some(worker);
            let active = matches!(task.state, State::Scheduled | State::Running);
            if !assigned_here || !active || reported_ids.contains(&task.id) {
                continue;
            }

            let count = self.misses.entry(task.id).or_insert(0);
            *count += 1;
            if *count < self.grace_ticks {
                debug!(
                    task_id = %task.id,
                    worker = %worker,
                    misses = *count,
                    "Assigned task not reported"
                );
                continue;
            }
            self.misses.remove(&task.id);

            warn!(task_id = %task.id, worker = %worker, "Task lost, marking failed");
            if let Err(e) = task.transition_to(State::Failed) {
                warn!(task_id = %task.id, error = %e, "Lost task already settled");
                continue;
            }
            if let Err(e) = self.manager.task_store().put(&task.id.to_string(), &task) {
                error!(task_id = %task.id, error = %e, "Failed to persist lost task");
                continue;
            }

            let event = TaskEvent::new(State::Failed, task.clone());
            if let Err(e) = self.manager.event_store().put(&event.id.to_string(), &event) {
                error!(task_id = %task.id, error = %e, "Failed to append event");
            }
        }
    }
}

//! Dispatch loop: deliver pending task events to workers.
//!
//! Pops the next pending event (FIFO), validates the desired
//! transition, asks the scheduler for a worker, and sends the
//! assignment. Exactly one dispatch attempt is in flight at a time; the
//! queue — not the store — is the delivery mechanism.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use drover_task::State;

use crate::manager::Manager;

/// What a single dispatch pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The pending queue was empty.
    Idle,
    /// The event was delivered and the assignment persisted.
    Dispatched(Uuid),
    /// No eligible worker; the event was requeued with no attempt
    /// charged.
    NoWorker(Uuid),
    /// Worker communication failed; the event was requeued for a
    /// bounded retry.
    Retried(Uuid),
    /// The retry budget is exhausted; the task was terminally failed.
    Failed(Uuid),
    /// The event asked for an illegal transition and was dropped.
    Rejected(Uuid),
}

/// The dispatch loop.
pub struct DispatchLoop {
    manager: Manager,
    interval: Duration,
}

impl DispatchLoop {
    pub fn new(manager: Manager, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Run until shutdown. Drains the queue each tick; an empty queue,
    /// a cluster with no eligible worker, or a communication failure
    /// waits out the polling interval before the next pass.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting dispatch loop"
        );

        let mut tick = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    loop {
                        match self.dispatch_once().await {
                            DispatchOutcome::Idle
                            | DispatchOutcome::NoWorker(_)
                            | DispatchOutcome::Retried(_) => break,
                            DispatchOutcome::Dispatched(_)
                            | DispatchOutcome::Failed(_)
                            | DispatchOutcome::Rejected(_) => continue,
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Dispatch loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Process at most one pending event.
    pub async fn dispatch_once(&self) -> DispatchOutcome {
        let Some(mut pending) = self.manager.pop_pending().await else {
            return DispatchOutcome::Idle;
        };

        let desired = pending.event.state;
        let mut task = pending.event.task.clone();
        let task_id = task.id;

        if let Err(e) = task.transition_to(desired) {
            warn!(task_id = %task_id, error = %e, "Dropping event with illegal desired transition");
            return DispatchOutcome::Rejected(task_id);
        }

        let snapshots = self.manager.worker_snapshots().await;
        let worker = match self.manager.select_worker(&task, &snapshots) {
            Ok(worker) => worker,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Scheduling failed, event stays pending");
                self.manager.requeue(pending).await;
                return DispatchOutcome::NoWorker(task_id);
            }
        };

        task.assigned_worker = Some(worker.clone());

        match self.manager.client().assign_task(&worker, &task).await {
            Ok(_) => {
                if let Err(e) = self.manager.task_store().put(&task_id.to_string(), &task) {
                    error!(task_id = %task_id, error = %e, "Failed to persist assignment");
                }
                let event = &pending.event;
                if let Err(e) = self.manager.event_store().put(&event.id.to_string(), event) {
                    error!(task_id = %task_id, error = %e, "Failed to persist event");
                }

                info!(task_id = %task_id, worker = %worker, "Task dispatched");
                DispatchOutcome::Dispatched(task_id)
            }
            Err(e) => {
                pending.attempts += 1;
                if pending.attempts >= self.manager.options().dispatch_max_attempts {
                    error!(
                        task_id = %task_id,
                        worker = %worker,
                        attempts = pending.attempts,
                        error = %e,
                        "Dispatch retries exhausted, failing task"
                    );

                    // Scheduled -> Failed keeps the lineage legal; the
                    // failure is durable and user-visible.
                    if let Err(e) = task.transition_to(State::Failed) {
                        warn!(task_id = %task_id, error = %e, "Task settled while failing dispatch");
                    }
                    if let Err(e) = self.manager.task_store().put(&task_id.to_string(), &task) {
                        error!(task_id = %task_id, error = %e, "Failed to persist failed task");
                    }
                    DispatchOutcome::Failed(task_id)
                } else {
                    warn!(
                        task_id = %task_id,
                        worker = %worker,
                        attempts = pending.attempts,
                        error = %e,
                        "Dispatch failed, requeueing"
                    );
                    self.manager.requeue(pending).await;
                    DispatchOutcome::Retried(task_id)
                }
            }
        }
    }
}

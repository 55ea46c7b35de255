//! Task executor: resident task map plus the accepted-work queue.
//!
//! The executor owns every task the manager has assigned to this node.
//! Assignments are queued on acceptance and started by the run loop;
//! container exits observed via `inspect` are folded back into the
//! reported task states, so the manager's status-sync loop always sees
//! the node's real view.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use drover_task::{InvalidTransition, State, Task};

use crate::runtime::{ContainerRuntime, ContainerStatus, RunSpec, RuntimeError};

/// Errors from executor operations.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("task not found: {0}")]
    NotFound(Uuid),

    #[error("task already accepted: {0}")]
    Duplicate(Uuid),

    #[error("assignment must be in the scheduled state, got {0}")]
    NotSchedulable(State),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Runs assigned tasks on this node via the container runtime.
pub struct Executor {
    runtime: Arc<dyn ContainerRuntime>,

    /// Resident tasks by id; the worker is authoritative for these.
    tasks: RwLock<HashMap<Uuid, Task>>,

    /// Accepted assignments waiting to be started.
    queue: Mutex<VecDeque<Uuid>>,
}

impl Executor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            tasks: RwLock::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Accept a task assignment from the manager.
    ///
    /// The assignment must arrive in the `Scheduled` state; anything
    /// else is an illegal transition request and is rejected without
    /// side effects.
    pub async fn accept(&self, task: Task) -> Result<Task, ExecutorError> {
        if task.state != State::Scheduled {
            return Err(ExecutorError::NotSchedulable(task.state));
        }

        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(ExecutorError::Duplicate(task.id));
        }

        info!(task_id = %task.id, image = %task.image, "Assignment accepted");
        tasks.insert(task.id, task.clone());
        self.queue.lock().await.push_back(task.id);

        Ok(task)
    }

    /// Run the executor loop until shutdown: start queued assignments
    /// and refresh observed container states.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, "Starting executor loop");

        let mut tick = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.start_queued().await;
                    self.refresh().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Executor shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Start every queued assignment.
    pub async fn start_queued(&self) {
        loop {
            let Some(task_id) = self.queue.lock().await.pop_front() else {
                break;
            };
            self.start_task(task_id).await;
        }
    }

    async fn start_task(&self, task_id: Uuid) {
        let task = {
            let tasks = self.tasks.read().await;
            tasks.get(&task_id).cloned()
        };

        let Some(task) = task else {
            return;
        };
        // The assignment may have been stopped while queued.
        if task.state != State::Scheduled {
            debug!(task_id = %task_id, state = %task.state, "Skipping queued task");
            return;
        }

        let spec = RunSpec::from_task(&task);
        let result = self.runtime.run(&spec).await;

        let mut tasks = self.tasks.write().await;
        let Some(stored) = tasks.get_mut(&task_id) else {
            return;
        };

        match result {
            Ok(container_id) => {
                if let Err(e) = stored.transition_to(State::Running) {
                    warn!(task_id = %task_id, error = %e, "Task state moved while starting");
                    return;
                }
                stored.container_id = Some(container_id);
                info!(task_id = %task_id, "Task running");
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Failed to start task");
                if let Err(e) = stored.transition_to(State::Failed) {
                    warn!(task_id = %task_id, error = %e, "Task state moved while failing");
                }
            }
        }
    }

    /// Fold observed container exits back into task states.
    pub async fn refresh(&self) {
        let running: Vec<(Uuid, String)> = {
            let tasks = self.tasks.read().await;
            tasks
                .values()
                .filter(|t| t.state == State::Running)
                .filter_map(|t| t.container_id.clone().map(|c| (t.id, c)))
                .collect()
        };

        for (task_id, container_id) in running {
            let status = match self.runtime.inspect(&container_id).await {
                Ok(status) => status,
                Err(RuntimeError::NotFound(_)) => ContainerStatus::Exited { code: -1 },
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Failed to inspect container");
                    continue;
                }
            };

            let target = match status {
                ContainerStatus::Running | ContainerStatus::Unknown => continue,
                ContainerStatus::Exited { code: 0 } => State::Completed,
                ContainerStatus::Exited { code } => {
                    warn!(task_id = %task_id, exit_code = code, "Container exited abnormally");
                    State::Failed
                }
            };

            let mut tasks = self.tasks.write().await;
            if let Some(stored) = tasks.get_mut(&task_id) {
                if let Err(e) = stored.transition_to(target) {
                    warn!(task_id = %task_id, error = %e, "Observed exit on settled task");
                }
            }
        }
    }

    /// Stop a task on the manager's request.
    ///
    /// A running task stops to `Completed`; one that never started is
    /// marked `Failed`. Stopping a task already in a terminal state is
    /// rejected without side effects.
    pub async fn stop(&self, task_id: Uuid) -> Result<Task, ExecutorError> {
        let task = {
            let tasks = self.tasks.read().await;
            tasks
                .get(&task_id)
                .cloned()
                .ok_or(ExecutorError::NotFound(task_id))?
        };

        let target = match task.state {
            State::Running => State::Completed,
            State::Scheduled => State::Failed,
            other => {
                return Err(ExecutorError::Transition(InvalidTransition {
                    from: other,
                    to: State::Completed,
                }))
            }
        };

        if let Some(container_id) = &task.container_id {
            if let Err(e) = self.runtime.stop(container_id).await {
                warn!(task_id = %task_id, error = %e, "Error stopping container");
            }
        }

        let mut tasks = self.tasks.write().await;
        let stored = tasks
            .get_mut(&task_id)
            .ok_or(ExecutorError::NotFound(task_id))?;
        stored.transition_to(target)?;

        info!(task_id = %task_id, state = %stored.state, "Task stopped");
        Ok(stored.clone())
    }

    /// Liveness of a single task, for the manager's health-check loop.
    pub async fn healthy(&self, task_id: Uuid) -> Result<bool, ExecutorError> {
        let task = {
            let tasks = self.tasks.read().await;
            tasks
                .get(&task_id)
                .cloned()
                .ok_or(ExecutorError::NotFound(task_id))?
        };

        if task.state != State::Running {
            return Ok(false);
        }
        let Some(container_id) = &task.container_id else {
            return Ok(false);
        };

        match self.runtime.inspect(container_id).await {
            Ok(ContainerStatus::Running) => Ok(true),
            Ok(_) => Ok(false),
            Err(RuntimeError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Snapshot of all resident tasks.
    pub async fn list(&self) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        tasks.values().cloned().collect()
    }

    pub async fn task(&self, task_id: Uuid) -> Option<Task> {
        let tasks = self.tasks.read().await;
        tasks.get(&task_id).cloned()
    }

    /// Number of tasks currently occupying this node.
    pub async fn active_count(&self) -> usize {
        let tasks = self.tasks.read().await;
        tasks
            .values()
            .filter(|t| matches!(t.state, State::Scheduled | State::Running))
            .count()
    }
}

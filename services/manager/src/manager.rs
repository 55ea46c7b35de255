//! The manager context: stores, pending queue, worker list, scheduler.
//!
//! Constructed once and shared by the API and the three reconciliation
//! loops. All mutation goes through the synchronized accessors here; no
//! ambient globals. `Manager` is cheap to clone (an `Arc` over the
//! inner state) so handlers and background loops each hold their own
//! handle.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use drover_store::{MemoryStore, SqliteStore, Store, StoreError};
use drover_task::{InvalidSpec, InvalidTransition, State, Task, TaskEvent, TaskSpec};

use crate::client::{ClientError, WorkerClient};
use crate::scheduler::{Scheduler, SchedulerError, WorkerSnapshot};

/// Bucket names in the durable store.
const TASKS_BUCKET: &str = "tasks";
const EVENTS_BUCKET: &str = "events";

/// Errors from manager operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    InvalidSpec(#[from] InvalidSpec),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Worker(#[from] ClientError),

    #[error("task {0} has no assigned worker")]
    Unassigned(Uuid),
}

/// Tunables fixed at manager construction.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Worker-communication failures tolerated per dispatch before the
    /// task is terminally failed.
    pub dispatch_max_attempts: u32,

    /// Restart-count cap for health-check-driven restarts.
    pub max_restarts: u32,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            dispatch_max_attempts: 3,
            max_restarts: 3,
        }
    }
}

/// A task event waiting for dispatch, with its delivery-attempt count.
///
/// Queue membership — not the persisted event log — governs delivery:
/// each desired transition is enqueued exactly once, so the dispatch
/// loop sees it at most once per attempt.
#[derive(Debug, Clone)]
pub struct PendingDispatch {
    pub event: TaskEvent,
    pub attempts: u32,
}

struct ManagerInner {
    tasks: Box<dyn Store<Task>>,
    events: Box<dyn Store<TaskEvent>>,
    pending: Mutex<VecDeque<PendingDispatch>>,
    workers: RwLock<Vec<String>>,
    scheduler: Box<dyn Scheduler>,
    client: WorkerClient,
    options: ManagerOptions,
}

/// Shared manager context.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    /// Create a manager over the given stores and scheduler.
    pub fn new(
        tasks: Box<dyn Store<Task>>,
        events: Box<dyn Store<TaskEvent>>,
        scheduler: Box<dyn Scheduler>,
        client: WorkerClient,
        options: ManagerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                tasks,
                events,
                pending: Mutex::new(VecDeque::new()),
                workers: RwLock::new(Vec::new()),
                scheduler,
                client,
                options,
            }),
        }
    }

    /// Create a manager backed by in-memory stores.
    pub fn in_memory(
        scheduler: Box<dyn Scheduler>,
        client: WorkerClient,
        options: ManagerOptions,
    ) -> Self {
        Self::new(
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
            scheduler,
            client,
            options,
        )
    }

    /// Create a manager backed by the durable store at `db_path`, one
    /// bucket per entity kind.
    pub fn durable(
        db_path: &std::path::Path,
        scheduler: Box<dyn Scheduler>,
        client: WorkerClient,
        options: ManagerOptions,
    ) -> Result<Self, StoreError> {
        let tasks: SqliteStore<Task> = SqliteStore::open(db_path, TASKS_BUCKET)?;
        let events: SqliteStore<TaskEvent> = SqliteStore::open(db_path, EVENTS_BUCKET)?;

        Ok(Self::new(
            Box::new(tasks),
            Box::new(events),
            scheduler,
            client,
            options,
        ))
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.inner.options
    }

    pub fn client(&self) -> &WorkerClient {
        &self.inner.client
    }

    pub fn task_store(&self) -> &dyn Store<Task> {
        self.inner.tasks.as_ref()
    }

    pub fn event_store(&self) -> &dyn Store<TaskEvent> {
        self.inner.events.as_ref()
    }

    // ---- submission boundary -------------------------------------------

    /// Accept a task submission: validate, persist the pending task and
    /// its desired-`Scheduled` event, and enqueue the event for
    /// dispatch.
    pub async fn submit(&self, spec: TaskSpec) -> Result<Task, ManagerError> {
        spec.validate()?;

        let task = Task::from_spec(spec);
        let event = TaskEvent::new(State::Scheduled, task.clone());

        self.inner.tasks.put(&task.id.to_string(), &task)?;
        self.inner.events.put(&event.id.to_string(), &event)?;
        self.enqueue(event).await;

        info!(task_id = %task.id, name = %task.name, "Task submitted");
        Ok(task)
    }

    /// Push a desired-transition event onto the pending queue.
    pub async fn enqueue(&self, event: TaskEvent) {
        self.inner
            .pending
            .lock()
            .await
            .push_back(PendingDispatch { event, attempts: 0 });
    }

    /// Pop the next pending event, FIFO.
    pub async fn pop_pending(&self) -> Option<PendingDispatch> {
        self.inner.pending.lock().await.pop_front()
    }

    /// Requeue an event whose dispatch did not complete.
    pub async fn requeue(&self, pending: PendingDispatch) {
        self.inner.pending.lock().await.push_back(pending);
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    // ---- worker list ---------------------------------------------------

    /// Register a worker. Duplicates are ignored.
    pub async fn add_worker(&self, addr: impl Into<String>) {
        let addr = addr.into();
        let mut workers = self.inner.workers.write().await;
        if !workers.contains(&addr) {
            info!(worker = %addr, "Worker added");
            workers.push(addr);
        }
    }

    /// Ordered snapshot of the known worker addresses.
    pub async fn workers(&self) -> Vec<String> {
        self.inner.workers.read().await.clone()
    }

    /// Snapshot the worker list for the scheduler, fetching load stats
    /// when the configured variant wants them. An unreachable worker
    /// keeps its slot with `stats: None`.
    pub async fn worker_snapshots(&self) -> Vec<WorkerSnapshot> {
        let addrs = self.workers().await;
        let mut snapshots = Vec::with_capacity(addrs.len());

        for addr in addrs {
            let stats = if self.inner.scheduler.needs_stats() {
                match self.inner.client.stats(&addr).await {
                    Ok(stats) => Some(stats),
                    Err(e) => {
                        tracing::warn!(worker = %addr, error = %e, "Failed to fetch worker stats");
                        None
                    }
                }
            } else {
                None
            };
            snapshots.push(WorkerSnapshot { addr, stats });
        }

        snapshots
    }

    /// Select a worker for a task against the given snapshot.
    pub fn select_worker(
        &self,
        task: &Task,
        snapshots: &[WorkerSnapshot],
    ) -> Result<String, SchedulerError> {
        self.inner.scheduler.select(task, snapshots)
    }

    // ---- task queries and control --------------------------------------

    /// Fetch a task from the store.
    pub fn task(&self, id: Uuid) -> Result<Task, ManagerError> {
        Ok(self.inner.tasks.get(&id.to_string())?)
    }

    /// Snapshot of all stored tasks.
    pub fn tasks(&self) -> Result<Vec<Task>, ManagerError> {
        Ok(self.inner.tasks.list()?)
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Result<Vec<TaskEvent>, ManagerError> {
        Ok(self.inner.events.list()?)
    }

    /// Stop a task on its assigned worker and fold the resulting state
    /// back into the store.
    pub async fn stop_task(&self, id: Uuid) -> Result<Task, ManagerError> {
        let mut task = self.task(id)?;

        if task.state.is_terminal() {
            return Err(ManagerError::Transition(InvalidTransition {
                from: task.state,
                to: State::Completed,
            }));
        }
        let worker = task
            .assigned_worker
            .clone()
            .ok_or(ManagerError::Unassigned(id))?;

        let stopped = self.inner.client.stop_task(&worker, id).await?;

        task.transition_to(stopped.state)?;
        task.container_id = stopped.container_id;
        task.finish_time = stopped.finish_time;
        self.inner.tasks.put(&task.id.to_string(), &task)?;

        info!(task_id = %id, state = %task.state, "Task stopped");
        Ok(task)
    }
}

//! Task events: immutable records of desired state transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::State;
use crate::task::Task;

/// An immutable, timestamped record expressing a desired state
/// transition for a task.
///
/// Events are appended to the event store, never mutated. The manager's
/// in-process pending queue (not the persisted log) governs delivery to
/// the dispatch loop; the log is an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: Uuid,
    /// The state the task should reach.
    pub state: State,
    pub timestamp: DateTime<Utc>,
    /// Full snapshot of the task at submission time.
    pub task: Task,
}

impl TaskEvent {
    /// Record a desired transition for `task`.
    pub fn new(state: State, task: Task) -> Self {
        Self {
            id: Uuid::new_v4(),
            state,
            timestamp: Utc::now(),
            task,
        }
    }
}

//! # drover-task
//!
//! Task and task-event model for the drover orchestrator.
//!
//! A [`Task`] is the unit of schedulable work: a container image plus the
//! resources it asks for, tracked through the lifecycle state machine in
//! [`State`]. A [`TaskEvent`] is an immutable record of a *desired* state
//! transition and carries a full snapshot of the task at the time it was
//! created; events are what the manager's dispatch loop consumes.
//!
//! Both the manager and the worker agents validate state changes against
//! the same transition table before committing them.

mod event;
mod state;
mod task;

pub use event::TaskEvent;
pub use state::{InvalidTransition, State};
pub use task::{InvalidSpec, RestartPolicy, Task, TaskSpec};

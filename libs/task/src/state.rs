//! Task lifecycle states and the legal-transition table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a task.
///
/// Normal progression is `Pending → Scheduled → Running → Completed`;
/// `Failed` is reachable from `Scheduled` or `Running`. `Completed` and
/// `Failed` are terminal — a failed task is restarted by creating a new
/// task record, never by moving the old one backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl State {
    /// All states, in normal progression order.
    pub const ALL: [State; 5] = [
        State::Pending,
        State::Scheduled,
        State::Running,
        State::Completed,
        State::Failed,
    ];

    /// Returns true if moving from `self` to `target` is a legal
    /// transition.
    pub fn can_transition_to(self, target: State) -> bool {
        matches!(
            (self, target),
            (State::Pending, State::Scheduled)
                | (State::Scheduled, State::Running)
                | (State::Scheduled, State::Failed)
                | (State::Running, State::Completed)
                | (State::Running, State::Failed)
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Scheduled => "scheduled",
            State::Running => "running",
            State::Completed => "completed",
            State::Failed => "failed",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An illegal state change was requested.
///
/// The stored task is left unchanged when this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: State,
    pub to: State,
}

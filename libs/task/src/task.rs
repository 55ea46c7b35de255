//! The task entity and its submission form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::state::{InvalidTransition, State};

/// Per-task rule governing whether a failed task is resubmitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    Never,
    Always,
    OnFailure,
}

impl RestartPolicy {
    /// Whether a failure under this policy may produce a restart.
    pub fn permits_restart(self) -> bool {
        !matches!(self, RestartPolicy::Never)
    }
}

/// A task submission as accepted at the API boundary.
///
/// Validated before any task or event record is created; an invalid spec
/// never reaches the stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub image: String,
    /// Requested CPU in fractional cores.
    #[serde(default)]
    pub cpu: f64,
    /// Requested memory in bytes.
    #[serde(default)]
    pub memory: u64,
    /// Requested disk in bytes.
    #[serde(default)]
    pub disk: u64,
    #[serde(default)]
    pub exposed_ports: Vec<u16>,
    /// Environment entries in `KEY=VALUE` form.
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    /// Optional HTTP path probed on the container for liveness.
    #[serde(default)]
    pub health_check: Option<String>,
}

/// A submission that was rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSpec {
    #[error("task name must not be empty")]
    MissingName,
    #[error("container image must not be empty")]
    MissingImage,
    #[error("cpu request must be a finite, non-negative number")]
    InvalidCpu,
    #[error("health check must be an absolute path, e.g. \"/health\"")]
    InvalidHealthCheck,
}

impl TaskSpec {
    /// Validate the submission.
    pub fn validate(&self) -> Result<(), InvalidSpec> {
        if self.name.trim().is_empty() {
            return Err(InvalidSpec::MissingName);
        }
        if self.image.trim().is_empty() {
            return Err(InvalidSpec::MissingImage);
        }
        if !self.cpu.is_finite() || self.cpu < 0.0 {
            return Err(InvalidSpec::InvalidCpu);
        }
        if let Some(path) = &self.health_check {
            if !path.starts_with('/') {
                return Err(InvalidSpec::InvalidHealthCheck);
            }
        }
        Ok(())
    }
}

/// A unit of schedulable containerized work.
///
/// The manager owns the canonical record; the worker a task is assigned
/// to owns the live container and reports state back. Exactly one worker
/// is authoritative for a task's container at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Globally unique, immutable after creation.
    pub id: Uuid,
    pub name: String,
    pub state: State,
    pub image: String,
    pub cpu: f64,
    pub memory: u64,
    pub disk: u64,
    #[serde(default)]
    pub exposed_ports: Vec<u16>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    /// Opaque runtime identifier, unset until the worker starts the
    /// container.
    #[serde(default)]
    pub container_id: Option<String>,
    /// Address of the worker the manager assigned this task to.
    #[serde(default)]
    pub assigned_worker: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub health_check: Option<String>,
    /// Number of restarts in this task's lineage; caps retries.
    #[serde(default)]
    pub restart_count: u32,
}

impl Task {
    /// Create a fresh pending task from a validated submission.
    pub fn from_spec(spec: TaskSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: spec.name,
            state: State::Pending,
            image: spec.image,
            cpu: spec.cpu,
            memory: spec.memory,
            disk: spec.disk,
            exposed_ports: spec.exposed_ports,
            env: spec.env,
            restart_policy: spec.restart_policy,
            container_id: None,
            assigned_worker: None,
            start_time: None,
            finish_time: None,
            health_check: spec.health_check,
            restart_count: 0,
        }
    }

    /// Commit a state transition, or reject it leaving the task
    /// unchanged.
    ///
    /// Entering `Running` stamps `start_time` (first time only); entering
    /// a terminal state stamps `finish_time`.
    pub fn transition_to(&mut self, target: State) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(target) {
            return Err(InvalidTransition {
                from: self.state,
                to: target,
            });
        }

        self.state = target;
        match target {
            State::Running if self.start_time.is_none() => {
                self.start_time = Some(Utc::now());
            }
            State::Completed | State::Failed => {
                self.finish_time = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    /// Build the replacement task for a failed run.
    ///
    /// The successor is a new record with a fresh id and the same spec;
    /// lineage is carried by the incremented restart count. The old task
    /// is left terminal, never resurrected.
    pub fn restart_successor(&self) -> Task {
        Task {
            id: Uuid::new_v4(),
            name: self.name.clone(),
            state: State::Pending,
            image: self.image.clone(),
            cpu: self.cpu,
            memory: self.memory,
            disk: self.disk,
            exposed_ports: self.exposed_ports.clone(),
            env: self.env.clone(),
            restart_policy: self.restart_policy,
            container_id: None,
            assigned_worker: None,
            start_time: None,
            finish_time: None,
            health_check: self.health_check.clone(),
            restart_count: self.restart_count + 1,
        }
    }
}

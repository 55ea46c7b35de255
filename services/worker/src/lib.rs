//! # drover-worker
//!
//! The worker agent runs on each node and realizes task assignments as
//! containers. It accepts assignments from the manager, starts them via
//! the container runtime, and answers the manager's status, health, and
//! load queries.
//!
//! ## Architecture
//!
//! - **Executor**: owns the resident task map and the accepted-work
//!   queue; starts queued tasks and keeps reported states truthful by
//!   inspecting containers.
//! - **Runtime**: the narrow container contract (run/stop/inspect) with
//!   a Docker implementation and a mock for tests and development.
//! - **API**: the HTTP surface the manager's loops consume.

pub mod api;
pub mod config;
pub mod executor;
pub mod runtime;
pub mod stats;

pub use config::Config;
pub use executor::{Executor, ExecutorError};
pub use runtime::{ContainerRuntime, ContainerStatus, DockerRuntime, MockRuntime, RunSpec};
pub use stats::WorkerStats;

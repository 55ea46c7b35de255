//! Container runtime interface and implementations.
//!
//! The orchestration core treats the runtime strictly as a black box:
//! run a spec and get an opaque container id, stop an id, inspect an id.
//! Nothing above this module depends on runtime internals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bollard::container::{
    CreateContainerOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::secret::{HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use drover_task::Task;

/// Errors from runtime operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container start failed: {0}")]
    StartFailed(String),
}

/// Everything the runtime needs to start a container.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Container name, unique on the node.
    pub name: String,
    pub image: String,
    /// Requested CPU in fractional cores.
    pub cpu: f64,
    /// Memory limit in bytes.
    pub memory: u64,
    pub env: Vec<String>,
    pub exposed_ports: Vec<u16>,
}

impl RunSpec {
    /// Derive a run spec from a task assignment.
    pub fn from_task(task: &Task) -> Self {
        Self {
            name: format!("drover-{}", task.id),
            image: task.image.clone(),
            cpu: task.cpu,
            memory: task.memory,
            env: task.env.clone(),
            exposed_ports: task.exposed_ports.clone(),
        }
    }
}

/// Observed container state, as reported by `inspect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Exited { code: i64 },
    /// The runtime knows the container but it is not running or exited
    /// (created, restarting, ...).
    Unknown,
}

/// Narrow contract between the worker and whatever runs containers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a container for `spec`, returning its opaque id.
    async fn run(&self, spec: &RunSpec) -> Result<String, RuntimeError>;

    /// Stop (and release) a container.
    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Report the container's current status.
    async fn inspect(&self, container_id: &str) -> Result<ContainerStatus, RuntimeError>;
}

/// Docker-backed runtime via the local daemon socket.
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub fn connect() -> Result<Self, RuntimeError> {
        let client = Docker::connect_with_unix_defaults()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(&self, spec: &RunSpec) -> Result<String, RuntimeError> {
        debug!(image = %spec.image, "Pulling image");
        let mut pull = self.client.create_image(
            Some(CreateImageOptions {
                from_image: spec.image.clone(),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull.next().await {
            progress?;
        }

        // Restarts are an orchestrator decision; the daemon must not
        // restart containers on its own.
        let host_config = HostConfig {
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::NO),
                maximum_retry_count: None,
            }),
            nano_cpus: Some((spec.cpu * 1_000_000_000.0) as i64),
            memory: Some(spec.memory as i64),
            publish_all_ports: Some(true),
            ..Default::default()
        };

        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .exposed_ports
            .iter()
            .map(|port| (format!("{port}/tcp"), HashMap::new()))
            .collect();

        let config = bollard::container::Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .client
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    ..Default::default()
                }),
                config,
            )
            .await?;

        self.client
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await?;

        info!(container_id = %created.id, image = %spec.image, "Container started");
        Ok(created.id)
    }

    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        info!(container_id = %container_id, "Stopping container");
        self.client
            .stop_container(container_id, None::<StopContainerOptions>)
            .await?;

        if let Err(e) = self
            .client
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    v: true,
                    ..Default::default()
                }),
            )
            .await
        {
            warn!(container_id = %container_id, error = %e, "Failed to remove container");
        }

        Ok(())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerStatus, RuntimeError> {
        let response = self.client.inspect_container(container_id, None).await?;

        let Some(state) = response.state else {
            return Ok(ContainerStatus::Unknown);
        };

        if state.running == Some(true) {
            return Ok(ContainerStatus::Running);
        }

        match state.exit_code {
            Some(code) => Ok(ContainerStatus::Exited { code }),
            None => Ok(ContainerStatus::Unknown),
        }
    }
}

/// Mock runtime for testing and development.
pub struct MockRuntime {
    /// Counter for generating container ids.
    id_counter: AtomicU64,

    /// Status per live container id.
    containers: Mutex<HashMap<String, ContainerStatus>>,

    /// Whether `run` should fail.
    fail_starts: bool,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            id_counter: AtomicU64::new(0),
            containers: Mutex::new(HashMap::new()),
            fail_starts: false,
        }
    }

    /// Create a mock runtime that fails every start.
    pub fn failing() -> Self {
        Self {
            id_counter: AtomicU64::new(0),
            containers: Mutex::new(HashMap::new()),
            fail_starts: true,
        }
    }

    /// Force a container into a status (for simulating crashes).
    pub fn set_status(&self, container_id: &str, status: ContainerStatus) {
        self.lock().insert(container_id.to_string(), status);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ContainerStatus>> {
        self.containers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self) -> String {
        let counter = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("mock_{counter:016x}")
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn run(&self, spec: &RunSpec) -> Result<String, RuntimeError> {
        if self.fail_starts {
            return Err(RuntimeError::StartFailed(
                "mock runtime configured to fail".to_string(),
            ));
        }

        let id = self.next_id();
        info!(container_id = %id, image = %spec.image, "[MOCK] Container started");
        self.lock().insert(id.clone(), ContainerStatus::Running);
        Ok(id)
    }

    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        let mut containers = self.lock();
        if !containers.contains_key(container_id) {
            return Err(RuntimeError::NotFound(container_id.to_string()));
        }

        info!(container_id = %container_id, "[MOCK] Container stopped");
        containers.insert(container_id.to_string(), ContainerStatus::Exited { code: 0 });
        Ok(())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerStatus, RuntimeError> {
        self.lock()
            .get(container_id)
            .copied()
            .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))
    }
}

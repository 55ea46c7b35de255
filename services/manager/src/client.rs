//! HTTP client for the worker agent endpoints.
//!
//! Every call is bounded by the client timeout; a timed-out or failed
//! connection surfaces as [`ClientError::Unreachable`] and the caller
//! treats that worker as unreachable for the current tick.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use drover_task::Task;

/// Errors talking to a worker.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Network failure or timeout; the worker is skipped this tick.
    #[error("worker {addr} unreachable: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: reqwest::Error,
    },

    /// The worker answered with a non-success status.
    #[error("worker {addr} rejected request: {status}: {body}")]
    Rejected {
        addr: String,
        status: StatusCode,
        body: String,
    },
}

impl ClientError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Unreachable { .. })
    }
}

/// A worker's load snapshot, as served by its stats endpoint.
///
/// Wire-compatible with the worker agent's own stats type; each side of
/// the boundary owns its copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub task_count: usize,
    pub cpu_total: f64,
    pub cpu_usage: f64,
    pub memory_total: u64,
    pub memory_available: u64,
    pub disk_total: u64,
    pub disk_available: u64,
}

#[derive(Debug, Deserialize)]
struct HealthReport {
    healthy: bool,
}

/// Client for the worker agent API.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    client: reqwest::Client,
}

impl WorkerClient {
    /// Create a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }

    /// Deliver a task assignment to a worker.
    pub async fn assign_task(&self, worker: &str, task: &Task) -> Result<Task, ClientError> {
        let url = format!("http://{worker}/v1/tasks");
        debug!(worker = %worker, task_id = %task.id, "Sending assignment");

        let response = self
            .client
            .post(&url)
            .json(task)
            .send()
            .await
            .map_err(|e| Self::unreachable(worker, e))?;

        Self::parse(worker, response).await
    }

    /// Fetch a worker's resident task list.
    pub async fn list_tasks(&self, worker: &str) -> Result<Vec<Task>, ClientError> {
        let url = format!("http://{worker}/v1/tasks");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::unreachable(worker, e))?;

        Self::parse(worker, response).await
    }

    /// Ask a worker to stop a task.
    pub async fn stop_task(&self, worker: &str, task_id: Uuid) -> Result<Task, ClientError> {
        let url = format!("http://{worker}/v1/tasks/{task_id}");

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Self::unreachable(worker, e))?;

        Self::parse(worker, response).await
    }

    /// Probe a task's liveness on its worker.
    pub async fn task_health(&self, worker: &str, task_id: Uuid) -> Result<bool, ClientError> {
        let url = format!("http://{worker}/v1/tasks/{task_id}/health");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::unreachable(worker, e))?;

        let report: HealthReport = Self::parse(worker, response).await?;
        Ok(report.healthy)
    }

    /// Fetch a worker's load snapshot.
    pub async fn stats(&self, worker: &str) -> Result<WorkerStats, ClientError> {
        let url = format!("http://{worker}/v1/stats");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::unreachable(worker, e))?;

        Self::parse(worker, response).await
    }

    fn unreachable(worker: &str, source: reqwest::Error) -> ClientError {
        ClientError::Unreachable {
            addr: worker.to_string(),
            source,
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        worker: &str,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected {
                addr: worker.to_string(),
                status,
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| Self::unreachable(worker, e))
    }
}

//! HTTP surface of the worker agent, consumed by the manager's loops.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use drover_task::Task;

use crate::executor::{Executor, ExecutorError};
use crate::stats;

/// Build the agent router.
pub fn router(executor: Arc<Executor>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/tasks", post(accept_task).get(list_tasks))
        .route("/v1/tasks/{id}", axum::routing::delete(stop_task))
        .route("/v1/tasks/{id}/health", get(task_health))
        .route("/v1/stats", get(node_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(executor)
}

/// JSON error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ExecutorError> for ApiError {
    fn from(err: ExecutorError) -> Self {
        let (status, code) = match &err {
            ExecutorError::NotFound(_) => (StatusCode::NOT_FOUND, "task_not_found"),
            ExecutorError::Duplicate(_) => (StatusCode::CONFLICT, "duplicate_task"),
            ExecutorError::NotSchedulable(_) | ExecutorError::Transition(_) => {
                (StatusCode::CONFLICT, "invalid_transition")
            }
            ExecutorError::Runtime(_) => (StatusCode::INTERNAL_SERVER_ERROR, "runtime_error"),
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub task_id: Uuid,
    pub healthy: bool,
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn accept_task(
    State(executor): State<Arc<Executor>>,
    Json(task): Json<Task>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let accepted = executor.accept(task).await?;
    Ok((StatusCode::CREATED, Json(accepted)))
}

async fn list_tasks(State(executor): State<Arc<Executor>>) -> Json<Vec<Task>> {
    Json(executor.list().await)
}

async fn stop_task(
    State(executor): State<Arc<Executor>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    let stopped = executor.stop(id).await?;
    Ok(Json(stopped))
}

async fn task_health(
    State(executor): State<Arc<Executor>>,
    Path(id): Path<Uuid>,
) -> Result<Json<HealthReport>, ApiError> {
    let healthy = executor.healthy(id).await?;
    Ok(Json(HealthReport {
        task_id: id,
        healthy,
    }))
}

async fn node_stats(State(executor): State<Arc<Executor>>) -> Json<stats::WorkerStats> {
    let task_count = executor.active_count().await;
    Json(stats::collect(task_count))
}

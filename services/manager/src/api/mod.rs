//! HTTP control API: the submission boundary plus cluster queries.

pub mod error;

use axum::extract::{Path, State};
use axum::http::{header, Method, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use drover_task::{Task, TaskEvent, TaskSpec};

use crate::manager::Manager;
use error::ApiError;

/// Create the control API router.
pub fn create_router(manager: Manager) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/tasks", get(list_tasks).post(submit_task))
        .route("/v1/tasks/{id}", get(get_task).delete(stop_task))
        .route("/v1/events", get(list_events))
        .route("/v1/workers", get(list_workers).post(add_worker))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(manager)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddWorkerRequest {
    pub addr: String,
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Submission boundary: an invalid spec is rejected here, before any
/// task or event record exists.
async fn submit_task(
    State(manager): State<Manager>,
    Json(spec): Json<TaskSpec>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = manager.submit(spec).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn list_tasks(State(manager): State<Manager>) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(manager.tasks()?))
}

async fn get_task(
    State(manager): State<Manager>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(manager.task(id)?))
}

async fn stop_task(
    State(manager): State<Manager>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(manager.stop_task(id).await?))
}

async fn list_events(State(manager): State<Manager>) -> Result<Json<Vec<TaskEvent>>, ApiError> {
    Ok(Json(manager.events()?))
}

async fn list_workers(State(manager): State<Manager>) -> Json<Vec<String>> {
    Json(manager.workers().await)
}

async fn add_worker(
    State(manager): State<Manager>,
    Json(request): Json<AddWorkerRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    manager.add_worker(request.addr.clone()).await;
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "worker": request.addr })),
    )
}

//! JSON error responses for the control API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::manager::ManagerError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

/// An API error with its HTTP mapping.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
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

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        match &err {
            ManagerError::InvalidSpec(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_spec", err.to_string())
            }
            ManagerError::Store(e) if e.is_not_found() => {
                Self::new(StatusCode::NOT_FOUND, "not_found", err.to_string())
            }
            ManagerError::Store(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                err.to_string(),
            ),
            ManagerError::Transition(_) => {
                Self::new(StatusCode::CONFLICT, "invalid_transition", err.to_string())
            }
            ManagerError::Unassigned(_) => {
                Self::new(StatusCode::CONFLICT, "task_unassigned", err.to_string())
            }
            ManagerError::Scheduler(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "no_eligible_worker",
                err.to_string(),
            ),
            ManagerError::Worker(_) => Self::new(
                StatusCode::BAD_GATEWAY,
                "worker_unreachable",
                err.to_string(),
            ),
        }
    }
}

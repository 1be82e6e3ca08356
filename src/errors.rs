use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::services::scheduling::SchedulingError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Scheduling(e) => match e {
                SchedulingError::InvalidRequest(_) | SchedulingError::DurationExceedsWindow { .. } => {
                    (StatusCode::BAD_REQUEST, "invalid")
                }
                SchedulingError::SlotConflict { .. } => (StatusCode::CONFLICT, "conflict"),
                SchedulingError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
                SchedulingError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                SchedulingError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
                SchedulingError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient"),
                SchedulingError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
            AppError::Pool(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }

    fn detail(&self) -> serde_json::Value {
        match self {
            AppError::Scheduling(SchedulingError::SlotConflict { conflicts, available }) => {
                json!({ "conflicts": conflicts, "availableSlots": available })
            }
            AppError::Scheduling(SchedulingError::DurationExceedsWindow { duration, window }) => {
                json!({ "reason": "duration_exceeds_window", "durationMinutes": duration, "windowMinutes": window })
            }
            AppError::Scheduling(SchedulingError::InvalidTransition { from, action }) => {
                json!({ "status": from, "action": action })
            }
            other => json!(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        match status {
            StatusCode::INTERNAL_SERVER_ERROR => tracing::error!(error = %self, "request failed"),
            StatusCode::SERVICE_UNAVAILABLE => tracing::warn!(error = %self, "storage unavailable"),
            _ => {}
        }

        let body = json!({
            "kind": kind,
            "detail": self.detail(),
            "error": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

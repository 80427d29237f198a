use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::engine::EngineError;

impl EngineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::InvalidInput(_) | EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::AlreadyExists(_) | EngineError::Conflict(_) | EngineError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            EngineError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            EngineError::Conflict(conflicts) => json!({
                "available": false,
                "conflictingBookings": conflicts,
                "error": self.to_string(),
            }),
            EngineError::StoreUnavailable(_) => {
                error!("{self}");
                json!({ "error": "reservation store temporarily unavailable" })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

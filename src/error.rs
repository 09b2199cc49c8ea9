use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures of the persistence accessors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event {0} not found")]
    EventNotFound(i64),
    #[error("user {0} not found")]
    UserNotFound(i64),
    #[error("could not create event with id {0}")]
    CreateFailed(i64),
    #[error("could not delete event with id {0}")]
    DeleteNotVerified(i64),
    #[error("could not delete user with id {0}")]
    UserDeleteNotVerified(i64),
    #[error("booked_count would exceed capacity for event {0}")]
    CapacityExceeded(i64),
    #[error("user {user_id} still organizes {events} event(s)")]
    UserHasEvents { user_id: i64, events: i64 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Error returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{message}")]
    Internal { message: String, details: Option<String> },
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    pub fn internal(message: impl Into<String>, details: impl Into<String>) -> Self {
        ApiError::Internal { message: message.into(), details: Some(details.into()) }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Internal { message, details } => ErrorBody { error: message, details },
            other => ErrorBody { error: other.to_string(), details: None },
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EventNotFound(_) | StoreError::UserNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            StoreError::CapacityExceeded(_) => ApiError::BadRequest(err.to_string()),
            StoreError::UserHasEvents { .. } => ApiError::Conflict(err.to_string()),
            StoreError::Database(ref e) => {
                tracing::error!("database error: {:?}", e);
                ApiError::internal("Database error", err.to_string())
            }
            other => ApiError::internal("Storage operation failed", other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::BadRequest(format!("Invalid request: {}", errors))
    }
}

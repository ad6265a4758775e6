use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BookingError>;

/// Failure taxonomy shared by the resolver, cart manager and order finalizer.
///
/// The HTTP layer only distinguishes "missing" (404), "contended" (409),
/// "malformed / needs new input" (400) and "storage down" (503).
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(String),

    /// Seat already ticketed or soft-locked by another user.
    #[error("seat {seat_id} of show {show_id} is unavailable")]
    Conflict { show_id: i64, seat_id: i64 },

    #[error("cart is empty")]
    EmptyState,

    #[error("invalid request: {0}")]
    Validation(String),

    /// A ticket insert hit the (show, seat) uniqueness constraint; the whole
    /// order was rolled back.
    #[error("seat {seat_id} of show {show_id} was claimed by another order")]
    RaceLoss { show_id: i64, seat_id: i64 },

    #[error("storage failure: {context}")]
    StorageFailure {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl BookingError {
    pub fn not_found(what: impl Into<String>) -> Self {
        BookingError::NotFound(what.into())
    }

    pub fn storage(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        BookingError::StorageFailure {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) => "not_found",
            BookingError::Conflict { .. } => "conflict",
            BookingError::EmptyState => "empty_state",
            BookingError::Validation(_) => "validation",
            BookingError::RaceLoss { .. } => "conflict",
            BookingError::StorageFailure { .. } => "storage_failure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Conflict { .. } | BookingError::RaceLoss { .. } => StatusCode::CONFLICT,
            BookingError::EmptyState | BookingError::Validation(_) => StatusCode::BAD_REQUEST,
            BookingError::StorageFailure { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            BookingError::StorageFailure { context, source } => {
                tracing::error!("storage failure ({}): {:?}", context, source);
                "Storage temporarily unavailable, please retry".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": self.kind(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

impl From<redis::RedisError> for BookingError {
    fn from(err: redis::RedisError) -> Self {
        BookingError::storage("reservation store", err)
    }
}

impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        BookingError::storage("database", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_loss_is_reported_as_conflict() {
        let err = BookingError::RaceLoss { show_id: 1, seat_id: 2 };
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn missing_and_malformed_are_distinguished() {
        assert_eq!(BookingError::not_found("show 4").status(), StatusCode::NOT_FOUND);
        assert_eq!(BookingError::EmptyState.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            BookingError::Validation("seats must not be empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn storage_failure_hides_details_from_clients() {
        let err = BookingError::storage("cart add", anyhow::anyhow!("connection reset"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures inside the server-side fan-out core.
///
/// Neither variant is ever surfaced to the handler that triggered a publish
/// as a request failure; see [`crate::realtime::Broadcaster::publish`].
#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("session channel is closed")]
    ChannelClosed,
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport dropped: {0}")]
    TransportDropped(String),
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),
    #[error("not connected")]
    NotConnected,
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("Poll not found")]
    PollNotFound,
    #[error("Option not found")]
    OptionNotFound,
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            PollError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            PollError::PollNotFound => (StatusCode::NOT_FOUND, "Poll not found"),
            PollError::OptionNotFound => (StatusCode::NOT_FOUND, "Option not found"),
            PollError::DatabaseError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for PollError {
    fn from(error: sqlx::Error) -> Self {
        PollError::DatabaseError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_not_found_maps_to_404() {
        let response = PollError::PollNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_request_maps_to_400() {
        let response = PollError::InvalidRequest("title is empty").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn sqlx_errors_become_database_errors() {
        let err: PollError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, PollError::DatabaseError(_)));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the rotation service
#[derive(Error, Debug)]
pub enum RotaError {
    // Pool errors
    #[error("Proxy list is empty")]
    EmptyPool,

    // Controller errors
    #[error("Rotation not ready: {0}")]
    NotReady(String),

    #[error("Rotation controller is not running")]
    ControllerUnavailable,

    // Session errors
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    #[error("Session timer aborted")]
    TimerAborted,

    // Resource errors
    #[error("Invalid resource URL: {0}")]
    InvalidResource(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for rotation operations
pub type Result<T> = std::result::Result<T, RotaError>;

impl RotaError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            RotaError::EmptyPool
            | RotaError::InvalidResource(_)
            | RotaError::InvalidConfig(_)
            | RotaError::InvalidRequest(_) => StatusCode::BAD_REQUEST,

            // 409 Conflict
            RotaError::NotReady(_) => StatusCode::CONFLICT,

            // 502 Bad Gateway
            RotaError::ConnectionFailure(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            RotaError::ControllerUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            RotaError::TimerAborted | RotaError::Io(_) | RotaError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for RotaError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for RotaError {
    fn from(err: url::ParseError) -> Self {
        RotaError::InvalidResource(err.to_string())
    }
}

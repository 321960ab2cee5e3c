use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bus::BusError;
use serde_json::json;
use thiserror::Error;
use types::errors::ValidationError;
use types::ids::OrderId;

/// Errors produced while correlating an order with its confirmation.
///
/// `Submission`, `Timeout` and `Cancelled` reach the caller. `Decode` and
/// `UnknownCorrelation` describe a single inbound message and are only
/// logged by the consumer.
#[derive(Debug, Error)]
pub enum CorrelatorError {
    #[error("order {0} is already pending")]
    DuplicateOrder(OrderId),

    #[error("failed to encode order: {0}")]
    Encode(String),

    #[error("submission failed: {0}")]
    Submission(#[from] BusError),

    #[error("no confirmation for order {0} before deadline")]
    Timeout(OrderId),

    #[error("order {0} cancelled before confirmation")]
    Cancelled(OrderId),

    #[error("malformed confirmation: {0}")]
    Decode(String),

    #[error("confirmation for order {0} matches no pending request")]
    UnknownCorrelation(OrderId),
}

/// Central error type for the Gateway application
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Gateway timeout: {0}")]
    Timeout(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<CorrelatorError> for AppError {
    fn from(err: CorrelatorError) -> Self {
        match err {
            CorrelatorError::Submission(_) | CorrelatorError::Cancelled(_) => {
                AppError::ServiceUnavailable(err.to_string())
            }
            CorrelatorError::Timeout(_) => AppError::Timeout(err.to_string()),
            other => AppError::InternalError(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                msg,
                "SERVICE_UNAVAILABLE",
            ),
            AppError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg, "TIMEOUT"),
            AppError::InternalError(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_ERROR",
                )
            }
        };

        let body = Json(json!({
            "error": code,
            "message": error_message
        }));

        (status, body).into_response()
    }
}

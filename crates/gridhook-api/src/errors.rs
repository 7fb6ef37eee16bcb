//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gridhook_core::ProcessingError;
use tracing::{error, warn};

/// Webhook handler errors with HTTP status code mapping
///
/// The provider retries on its own schedule and reads nothing but the status
/// code, so failure responses carry an empty body:
///
/// - `400 Bad Request`: malformed body, unparseable envelope, or an
///   unrecognized `aeg-event-type` header — permanent, never retried here
/// - `500 Internal Server Error`: store or transport failures that abort the
///   affected request
///
/// Detailed error information is logged server-side only.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Processing pipeline failure (parse, store or publish)
    #[error("Processing failed: {0}")]
    Processing(#[from] ProcessingError),

    /// The `aeg-event-type` header is missing or carries an unknown value
    #[error("Unknown event type header: {header:?}")]
    UnknownEventType { header: Option<String> },
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Processing(processing) if processing.is_client_error() => {
                warn!(error = %self, "Rejecting malformed webhook request");
                StatusCode::BAD_REQUEST
            }
            Self::Processing(_) => {
                error!(error = %self, "Webhook processing failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::UnknownEventType { .. } => {
                warn!(error = %self, "Rejecting unclassifiable webhook request");
                StatusCode::BAD_REQUEST
            }
        };

        status.into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}

//! # Gridhook HTTP Service
//!
//! HTTP surface for receiving push notifications from the event-distribution
//! provider and answering its webhook handshake.
//!
//! A single endpoint carries the whole protocol:
//! - `OPTIONS` answers the provider's pre-flight negotiation by echoing the
//!   allowed rate and origin
//! - `POST` is classified by the `aeg-event-type` header into the
//!   subscription-validation handshake or a notification delivery
//! - any other method receives `405 Method Not Allowed`
//!
//! No state is retained across requests; the processor behind the endpoint is
//! shared and safe for concurrent use.

pub mod errors;

use axum::{
    extract::State,
    http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, options},
    Router,
};
use errors::{ConfigError, ServiceError, WebhookHandlerError};
use gridhook_core::EventProcessor;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Header the provider classifies POST deliveries with.
pub const EVENT_TYPE_HEADER: &str = "aeg-event-type";

/// `aeg-event-type` value for the subscription-validation handshake.
pub const SUBSCRIPTION_VALIDATION: &str = "SubscriptionValidation";

/// `aeg-event-type` value for notification deliveries.
pub const NOTIFICATION: &str = "Notification";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Processor handling parse, store and publish for inbound events
    pub processor: Arc<EventProcessor>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServiceConfig, processor: Arc<EventProcessor>) -> Self {
        Self { config, processor }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Webhook endpoint settings
    pub webhook: WebhookConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Validate the configuration before startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be non-zero".to_string(),
            });
        }

        if !self.webhook.endpoint_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!(
                    "webhook.endpoint_path must start with '/': {}",
                    self.webhook.endpoint_path
                ),
            });
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

/// Webhook endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Webhook endpoint path
    pub endpoint_path: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/api/messages".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level filter
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes = Router::new().route(
        &state.config.webhook.endpoint_path,
        options(handle_preflight).post(handle_webhook),
    );

    let health_routes = Router::new().route("/health", get(handle_health_check));

    Router::new()
        .merge(webhook_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server with graceful shutdown
pub async fn start_server(
    config: ServiceConfig,
    processor: Arc<EventProcessor>,
) -> Result<(), ServiceError> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|error| ServiceError::BindFailed {
            address: format!("{}:{}", config.server.host, config.server.port),
            message: format!("invalid bind address: {error}"),
        })?;

    let shutdown_timeout = std::time::Duration::from_secs(config.server.shutdown_timeout_seconds);

    let state = AppState::new(config, processor);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|error| ServiceError::BindFailed {
            address: addr.to_string(),
            message: error.to_string(),
        })?;

    info!("Starting HTTP server on {}", addr);

    let shutdown_signal = async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C signal handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
            },
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
            },
        }
    };

    // In-flight requests are allowed to complete; new connections stop being
    // accepted as soon as the shutdown signal fires.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|error| ServiceError::ServerFailed {
            message: error.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Handle the provider's pre-flight negotiation.
///
/// Echoes the allowed rate and origin derived from the request headers.
/// Issues no event processing and always succeeds.
async fn handle_preflight(headers: HeaderMap) -> Response {
    let origin = headers
        .get("WebHook-Request-Origin")
        .and_then(|value| value.to_str().ok());
    let callback = headers
        .get("WebHook-Request-Callback")
        .and_then(|value| value.to_str().ok());
    let rate = headers
        .get("WebHook-Request-Rate")
        .and_then(|value| value.to_str().ok());

    info!(
        webhook_request_origin = origin,
        webhook_request_callback = callback,
        webhook_request_rate = rate,
        "Processing OPTIONS pre-flight request"
    );

    let mut response = StatusCode::OK.into_response();
    response.headers_mut().insert(
        HeaderName::from_static("webhook-allowed-rate"),
        HeaderValue::from_static("*"),
    );

    if let Some(origin) = origin {
        match HeaderValue::from_str(origin) {
            Ok(value) => {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("webhook-allowed-origin"), value);
            }
            Err(_) => warn!(origin, "Request origin is not a valid header value"),
        }
    }

    response
}

/// Response body for the subscription-validation handshake.
#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    #[serde(rename = "validationResponse")]
    pub validation_response: String,
}

/// Handle a classified POST delivery from the provider.
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, WebhookHandlerError> {
    // The header value match is case-sensitive by protocol.
    let event_type = headers
        .get(EVENT_TYPE_HEADER)
        .and_then(|value| value.to_str().ok());

    match event_type {
        Some(SUBSCRIPTION_VALIDATION) => {
            info!("Handling subscription validation event");
            let code = state
                .processor
                .handle_subscription_validation(&body)
                .await?;

            Ok(Json(ValidationResponse {
                validation_response: code,
            })
            .into_response())
        }
        Some(NOTIFICATION) => {
            info!("Handling notification event");
            state.processor.handle_notification(&body).await?;
            Ok(StatusCode::OK.into_response())
        }
        other => {
            warn!(header = other, "Unknown aeg-event-type header");
            Err(WebhookHandlerError::UnknownEventType {
                header: other.map(String::from),
            })
        }
    }
}

/// Liveness endpoint.
async fn handle_health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

//! # Fan-out Publisher
//!
//! Wraps the publish side of the fan-out transport in a bounded
//! exponential-backoff retry policy.
//!
//! The outbound message is a fixed envelope regardless of which wire format
//! originated the event, so subscribers never need to know about the dual
//! formats the provider delivers.

use crate::event::Event;
use crate::retry::{RetryPolicy, RetryState};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

/// Content type used for all fan-out messages.
pub const FANOUT_CONTENT_TYPE: &str = "application/json";

// ============================================================================
// Transport Contract
// ============================================================================

/// Errors raised by fan-out transport implementations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transient transport failure: {message}")]
    Transient { message: String },

    #[error("Transport authentication failed: {message}")]
    Auth { message: String },

    #[error("Transport operation failed: {message}")]
    Other { message: String },
}

impl TransportError {
    /// Only transient failures are eligible for retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Publish-capable real-time broadcast transport.
///
/// Covers both roles the transport plays: broadcasting to all connected
/// subscribers, and minting short-lived client access URIs that the
/// subscriber relay uses to connect as a listener.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FanoutTransport: Send + Sync {
    /// Broadcast a payload to every connected subscriber.
    async fn send_to_all(&self, payload: &[u8], content_type: &str)
        -> Result<(), TransportError>;

    /// Obtain a short-lived client access URI for a listener connection.
    async fn client_access_uri<'a>(&self, user_id: Option<&'a str>)
        -> Result<Url, TransportError>;
}

// ============================================================================
// Outbound Envelope
// ============================================================================

/// Fixed message shape broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope<'a> {
    pub id: &'a str,
    pub event_type: &'a str,
    pub subject: &'a str,
    pub event_time: String,
    pub payload: &'a str,
}

impl<'a> OutboundEnvelope<'a> {
    /// Build the envelope for an event.
    pub fn from_event(event: &'a Event) -> Self {
        Self {
            id: &event.id,
            event_type: &event.event_type,
            subject: &event.subject,
            event_time: event.timestamp.to_rfc3339(),
            payload: &event.payload,
        }
    }
}

// ============================================================================
// Publisher
// ============================================================================

/// Errors raised by [`EventPublisher::publish`].
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publish abandoned after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Publish failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to encode outbound envelope: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl PublishError {
    /// Exhausted retries are non-fatal to the enclosing request; the event is
    /// already durably stored and can be recovered from the store.
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }
}

/// Retry-protected fan-out publisher.
///
/// Retries are fully sequential per call; the policy is immutable and shared
/// across all publishes. Dropping the future between attempts (request
/// cancellation) aborts the remaining retries.
pub struct EventPublisher {
    transport: std::sync::Arc<dyn FanoutTransport>,
    policy: RetryPolicy,
}

impl EventPublisher {
    /// Create a publisher over a transport with an injected retry policy.
    pub fn new(transport: std::sync::Arc<dyn FanoutTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Broadcast one event to all subscribers.
    ///
    /// Transient transport failures are retried per the policy with sleeps
    /// between attempts; any other failure class fails immediately.
    pub async fn publish(&self, event: &Event) -> Result<(), PublishError> {
        let envelope = OutboundEnvelope::from_event(event);
        let body = serde_json::to_vec(&envelope)?;

        let mut state = RetryState::new();
        loop {
            state.record_attempt();
            match self
                .transport
                .send_to_all(&body, FANOUT_CONTENT_TYPE)
                .await
            {
                Ok(()) => {
                    debug!(event_id = %event.id, attempt = state.attempt, "Published event to all subscribers");
                    return Ok(());
                }
                Err(error) if error.is_transient() && state.can_retry(&self.policy) => {
                    let delay = state.next_delay(&self.policy);
                    warn!(
                        event_id = %event.id,
                        attempt = state.attempt,
                        retry_in_secs = delay.as_secs_f64(),
                        %error,
                        "Transient publish failure; will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) if error.is_transient() => {
                    return Err(PublishError::RetriesExhausted {
                        attempts: state.attempt,
                        source: error,
                    });
                }
                Err(error) => return Err(PublishError::Transport(error)),
            }
        }
    }
}

#[cfg(test)]
#[path = "publish_tests.rs"]
mod tests;

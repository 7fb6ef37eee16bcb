//! # Subscriber Relay
//!
//! Long-running background process that authenticates to the fan-out
//! transport as a listener, receives broadcast messages, and re-emits them to
//! locally connected clients over a separate broadcast channel.
//!
//! The relay has its own lifecycle, independent of request handling. Start
//! and stop are invoked by the hosting lifecycle and are not reentrant-safe
//! against each other; the `&mut self` receivers make the external
//! serialization requirement explicit.

use crate::publish::{FanoutTransport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Fixed event name under which relayed messages reach local listeners.
pub const RELAY_EVENT_NAME: &str = "gridupdate";

// ============================================================================
// Listener Contracts
// ============================================================================

/// Scope a fan-out message was delivered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageScope {
    /// Message addressed to a named group
    Group(String),
    /// Message sent directly by the transport server
    Server,
}

/// A message received from the fan-out transport.
#[derive(Debug, Clone)]
pub struct RelayMessage {
    pub scope: MessageScope,
    pub data: Bytes,
}

/// Listener side of the fan-out transport.
#[async_trait]
pub trait FanoutListener: Send + Sync {
    /// Open a persistent connection using a short-lived client access URI.
    async fn connect(&self, access_uri: &Url) -> Result<Box<dyn FanoutConnection>, TransportError>;
}

/// An open listener connection.
///
/// Implementations own their reconnect behavior; a terminal close is
/// signalled by `next_message` returning `Ok(None)`.
#[async_trait]
pub trait FanoutConnection: Send {
    /// Receive the next group- or server-scoped message.
    async fn next_message(&mut self) -> Result<Option<RelayMessage>, TransportError>;

    /// Close and release the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Broadcast channel to locally connected clients.
///
/// Forwarding is fire-and-forget: no acknowledgment and no backpressure is
/// applied to the upstream transport, so implementations must not block.
pub trait LocalBroadcast: Send + Sync {
    fn send_to_all_local(&self, event_name: &str, data: Bytes);
}

// ============================================================================
// Local Broadcast over a Tokio Channel
// ============================================================================

/// A message as seen by local listeners.
#[derive(Debug, Clone)]
pub struct LocalMessage {
    pub event: String,
    pub data: Bytes,
}

/// [`LocalBroadcast`] backed by a `tokio::sync::broadcast` channel.
///
/// Stands in for the real-time hub local clients attach to. Listeners that
/// are disconnected or lagging simply miss messages; there is no queued
/// replay.
#[derive(Debug, Clone)]
pub struct ChannelBroadcast {
    sender: broadcast::Sender<LocalMessage>,
}

impl ChannelBroadcast {
    /// Create a channel retaining up to `capacity` undelivered messages per
    /// listener.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Attach a local listener.
    pub fn subscribe(&self) -> broadcast::Receiver<LocalMessage> {
        self.sender.subscribe()
    }
}

impl LocalBroadcast for ChannelBroadcast {
    fn send_to_all_local(&self, event_name: &str, data: Bytes) {
        // A send error only means no listener is currently attached.
        let _ = self.sender.send(LocalMessage {
            event: event_name.to_string(),
            data,
        });
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Errors raised by the relay lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Failed to obtain client access credential: {0}")]
    Credential(#[source] TransportError),

    #[error("Failed to connect to fan-out transport: {0}")]
    Connect(#[source] TransportError),

    #[error("Relay cannot start from the {state} state")]
    InvalidState { state: &'static str },
}

enum RelayState {
    NotStarted,
    Connected {
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    },
    Stopped,
}

impl RelayState {
    fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::Connected { .. } => "connected",
            Self::Stopped => "stopped",
        }
    }
}

/// Subscriber-side relay with an explicit start/stop state machine.
///
/// Exactly one connection is owned per relay instance; it is handed to the
/// dispatch task on start and closed on stop. Startup failures are fatal:
/// the run loop is never entered without credentials and an open connection.
pub struct SubscriberRelay {
    transport: Arc<dyn FanoutTransport>,
    listener: Arc<dyn FanoutListener>,
    local: Arc<dyn LocalBroadcast>,
    state: RelayState,
}

impl SubscriberRelay {
    /// Create a relay over the fan-out transport and a local broadcast sink.
    pub fn new(
        transport: Arc<dyn FanoutTransport>,
        listener: Arc<dyn FanoutListener>,
        local: Arc<dyn LocalBroadcast>,
    ) -> Self {
        Self {
            transport,
            listener,
            local,
            state: RelayState::NotStarted,
        }
    }

    /// Obtain credentials, connect, and spawn the dispatch task.
    pub async fn start(&mut self) -> Result<(), RelayError> {
        if !matches!(self.state, RelayState::NotStarted) {
            return Err(RelayError::InvalidState {
                state: self.state.name(),
            });
        }

        let access_uri = self
            .transport
            .client_access_uri(None)
            .await
            .map_err(RelayError::Credential)?;
        info!("Obtained client access URI for relay connection");

        let connection = self
            .listener
            .connect(&access_uri)
            .await
            .map_err(RelayError::Connect)?;
        info!("Relay connected to fan-out transport");

        let (shutdown, shutdown_rx) = oneshot::channel();
        let local = Arc::clone(&self.local);
        let task = tokio::spawn(dispatch_loop(connection, local, shutdown_rx));

        self.state = RelayState::Connected { shutdown, task };
        Ok(())
    }

    /// Close the connection and wait for the dispatch task to finish.
    ///
    /// Safe to call when the relay was never started, and idempotent once
    /// stopped.
    pub async fn stop(&mut self) {
        match std::mem::replace(&mut self.state, RelayState::Stopped) {
            RelayState::Connected { shutdown, task } => {
                info!("Stopping subscriber relay");
                let _ = shutdown.send(());
                if let Err(error) = task.await {
                    warn!(%error, "Relay dispatch task ended abnormally");
                }
                info!("Subscriber relay stopped");
            }
            RelayState::NotStarted | RelayState::Stopped => {}
        }
    }
}

/// Reactive dispatch: forward every received message to local listeners until
/// the transport closes the connection or shutdown is requested.
async fn dispatch_loop(
    mut connection: Box<dyn FanoutConnection>,
    local: Arc<dyn LocalBroadcast>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            received = connection.next_message() => match received {
                Ok(Some(message)) => {
                    match &message.scope {
                        MessageScope::Group(group) => {
                            debug!(%group, "Relay received group message");
                        }
                        MessageScope::Server => {
                            debug!("Relay received server message");
                        }
                    }
                    local.send_to_all_local(RELAY_EVENT_NAME, message.data);
                }
                Ok(None) => {
                    info!("Fan-out connection closed by transport");
                    break;
                }
                Err(error) => {
                    warn!(%error, "Error receiving fan-out message");
                }
            },
        }
    }

    if let Err(error) = connection.close().await {
        warn!(%error, "Failed to close fan-out connection cleanly");
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;

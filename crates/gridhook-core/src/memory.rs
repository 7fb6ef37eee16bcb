//! In-memory fan-out transport for testing and development.
//!
//! Implements both sides of the fan-out contract over a loopback broadcast
//! channel: messages published with [`FanoutTransport::send_to_all`] reach
//! every connection opened through [`FanoutListener::connect`].
//!
//! This provider is intended for:
//! - Unit and integration testing of fan-out consumers
//! - Self-contained deployments without an external transport engine
//! - Reference implementation for cloud transports

use crate::publish::{FanoutTransport, TransportError};
use crate::relay::{FanoutConnection, FanoutListener, MessageScope, RelayMessage};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use url::Url;

/// Loopback fan-out transport.
#[derive(Debug, Clone)]
pub struct InMemoryFanout {
    sender: broadcast::Sender<RelayMessage>,
}

impl InMemoryFanout {
    /// Create a loopback transport retaining up to `capacity` undelivered
    /// messages per listener.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Number of currently connected listeners.
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryFanout {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl FanoutTransport for InMemoryFanout {
    async fn send_to_all(
        &self,
        payload: &[u8],
        _content_type: &str,
    ) -> Result<(), TransportError> {
        let message = RelayMessage {
            scope: MessageScope::Server,
            data: Bytes::copy_from_slice(payload),
        };

        // A send error only means no listener is connected right now; the
        // broadcast is still a success for the publisher.
        let _ = self.sender.send(message);
        Ok(())
    }

    async fn client_access_uri<'a>(
        &self,
        user_id: Option<&'a str>,
    ) -> Result<Url, TransportError> {
        let uri = match user_id {
            Some(user) => format!("memory://fanout/client?user={user}"),
            None => "memory://fanout/client".to_string(),
        };

        Url::parse(&uri).map_err(|error| TransportError::Other {
            message: format!("invalid client access URI: {error}"),
        })
    }
}

#[async_trait]
impl FanoutListener for InMemoryFanout {
    async fn connect(
        &self,
        _access_uri: &Url,
    ) -> Result<Box<dyn FanoutConnection>, TransportError> {
        Ok(Box::new(InMemoryConnection {
            receiver: self.sender.subscribe(),
            open: true,
        }))
    }
}

/// A listener connection onto the loopback channel.
struct InMemoryConnection {
    receiver: broadcast::Receiver<RelayMessage>,
    open: bool,
}

#[async_trait]
impl FanoutConnection for InMemoryConnection {
    async fn next_message(&mut self) -> Result<Option<RelayMessage>, TransportError> {
        if !self.open {
            return Ok(None);
        }

        match self.receiver.recv().await {
            Ok(message) => Ok(Some(message)),
            Err(broadcast::error::RecvError::Closed) => Ok(None),
            Err(broadcast::error::RecvError::Lagged(missed)) => Err(TransportError::Transient {
                message: format!("listener lagged by {missed} messages"),
            }),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

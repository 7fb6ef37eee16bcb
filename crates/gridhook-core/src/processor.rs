//! # Event Processor
//!
//! Orchestrates the webhook protocol: parse an inbound body, record each
//! event exactly once and broadcast it to subscribers.
//!
//! Side effects are ordered store-before-publish per event so a subscriber
//! never observes an event that was not durably recorded. If a publish fails
//! after a successful store there is no rollback; the event remains
//! recoverable from the store.

use crate::event::{self, Event, ParseError};
use crate::publish::{EventPublisher, PublishError};
use crate::store::{EventRecord, EventStore, StoreError};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Errors raised while processing a webhook body.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Failed to parse request body: {0}")]
    Parse(#[from] ParseError),

    #[error("Validation event carries no validationCode")]
    MissingValidationCode,

    #[error("Failed to store event: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to publish event: {0}")]
    Publish(#[from] PublishError),
}

impl ProcessingError {
    /// Client errors map to 4xx responses and are never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::MissingValidationCode)
    }
}

/// Webhook processing pipeline: parse, store, publish.
///
/// Holds no per-request state; safe to share across concurrent requests.
pub struct EventProcessor {
    store: Arc<dyn EventStore>,
    publisher: Arc<EventPublisher>,
}

impl EventProcessor {
    /// Create a processor over an event store and a fan-out publisher.
    pub fn new(store: Arc<dyn EventStore>, publisher: Arc<EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Handle the provider's subscription-validation handshake.
    ///
    /// Parses exactly one legacy-format event, records and broadcasts it,
    /// then returns the validation code the provider expects echoed back.
    /// Omitting or malforming the echo causes the provider to deactivate the
    /// subscription, so every failure here surfaces to the caller.
    pub async fn handle_subscription_validation(
        &self,
        body: &str,
    ) -> Result<String, ProcessingError> {
        let events = event::parse_grid_events(body)?;
        let event = events
            .into_iter()
            .next()
            .ok_or(ProcessingError::MissingValidationCode)?;

        info!(event_id = %event.id, "Parsed subscription validation event");

        self.store_and_publish(&event).await?;

        let code = event
            .validation_code()
            .ok_or(ProcessingError::MissingValidationCode)?;

        info!(event_id = %event.id, "Echoing validation code");
        Ok(code.to_string())
    }

    /// Handle a notification delivery in either wire format.
    ///
    /// Cloud envelopes carry a single event; a failure there fails the
    /// request. Legacy envelopes may carry a batch, and each parsed event is
    /// processed independently: one event failing to store or publish never
    /// prevents its siblings from being processed.
    pub async fn handle_notification(&self, body: &str) -> Result<(), ProcessingError> {
        if event::is_cloud_event(body) {
            info!("Detected cloud event format");
            let parsed = event::parse_cloud_event(body)?;
            self.store_and_publish(&parsed).await?;
            return Ok(());
        }

        info!("Detected legacy grid format");
        let events = event::parse_grid_events(body)?;
        info!(count = events.len(), "Parsed grid event batch");

        for parsed in &events {
            if let Err(err) = self.store_and_publish(parsed).await {
                error!(
                    event_id = %parsed.id,
                    error = %err,
                    "Failed to process event in batch; continuing with siblings"
                );
            }
        }

        Ok(())
    }

    /// Record one event and broadcast it, in that order.
    ///
    /// A duplicate store result means the provider redelivered an event that
    /// is already at rest: it is logged and treated as success, and the
    /// publish still happens — subscribers redundantly re-receive, which is
    /// acceptable under at-least-once semantics. Exhausted publish retries
    /// are logged and swallowed; the event is already stored.
    async fn store_and_publish(&self, event: &Event) -> Result<(), ProcessingError> {
        match self.store.add(EventRecord::from_event(event)).await {
            Ok(()) => info!(event_id = %event.id, schema = %event.schema, "Stored event"),
            Err(err) if err.is_duplicate() => {
                warn!(event_id = %event.id, "Event already stored; treating redelivery as no-op");
            }
            Err(err) => return Err(err.into()),
        }

        match self.publisher.publish(event).await {
            Ok(()) => {
                info!(event_id = %event.id, "Published event to fan-out channel");
                Ok(())
            }
            Err(err) if err.is_retries_exhausted() => {
                error!(
                    event_id = %event.id,
                    error = %err,
                    "Publish abandoned; event remains recoverable from the store"
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;

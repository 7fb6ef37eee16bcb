//! # Event Model and Parser
//!
//! The provider delivers notifications in two incompatible envelopes: the
//! legacy grid format (a JSON array of events, or occasionally a single bare
//! object) and the cloud-event format (always a single object carrying a
//! `specversion` field). Both resolve to the internal [`Event`] shape here.
//!
//! Parsing is pure and performs no I/O. The original serialized text of every
//! envelope is retained verbatim so it can be stored for replay and audit.

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::value::RawValue;
use std::fmt;
use tracing::warn;

// ============================================================================
// Wire Formats
// ============================================================================

/// Legacy grid event envelope as delivered by the provider.
///
/// The provider's serializer is case-insensitive; camelCase and PascalCase
/// are the spellings observed in the wild, so both are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridEvent {
    #[serde(alias = "Id")]
    pub id: String,

    #[serde(alias = "EventType")]
    pub event_type: String,

    #[serde(default, alias = "Subject")]
    pub subject: String,

    #[serde(alias = "EventTime")]
    pub event_time: DateTime<FixedOffset>,

    #[serde(default, alias = "Data")]
    pub data: Option<serde_json::Value>,

    #[serde(default, alias = "Topic")]
    pub topic: Option<String>,
}

/// Cloud event envelope, identified by its `specversion` field.
///
/// Reference: <https://github.com/cloudevents/spec/tree/v1.0-rc1>
#[derive(Debug, Clone, Deserialize)]
pub struct CloudEvent {
    #[serde(alias = "SpecVersion")]
    pub specversion: String,

    #[serde(alias = "Id")]
    pub id: String,

    #[serde(rename = "type", alias = "Type")]
    pub event_type: String,

    #[serde(default, alias = "Source")]
    pub source: Option<String>,

    #[serde(default, alias = "Subject")]
    pub subject: String,

    #[serde(alias = "Time")]
    pub time: DateTime<FixedOffset>,

    #[serde(default, alias = "Data")]
    pub data: Option<serde_json::Value>,
}

// ============================================================================
// Internal Representation
// ============================================================================

/// Which wire format produced an event.
///
/// Used as a partition discriminator in storage and never reinterpreted after
/// an event has been stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSchema {
    /// Legacy grid envelope (`id, eventType, subject, eventTime, data, topic`)
    LegacyGrid,
    /// Cloud event envelope (`specversion, id, type, source, subject, time, data`)
    CloudEvent,
}

impl EventSchema {
    /// Storage discriminator string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LegacyGrid => "eventgrid",
            Self::CloudEvent => "cloudevent",
        }
    }
}

impl fmt::Display for EventSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized, format-agnostic event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Provider-assigned unique identifier; the deduplication key
    pub id: String,

    /// Semantic event type
    pub event_type: String,

    /// Resource path the event concerns
    pub subject: String,

    /// Provider-assigned occurrence time, offset preserved
    pub timestamp: DateTime<FixedOffset>,

    /// Original serialized envelope, verbatim
    pub payload: String,

    /// Format-specific body; decoded lazily by consumers that know the shape
    pub data: Option<serde_json::Value>,

    /// Wire format that produced this event
    pub schema: EventSchema,
}

impl Event {
    fn from_grid(event: GridEvent, payload: String) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type,
            subject: event.subject,
            timestamp: event.event_time,
            payload,
            data: event.data,
            schema: EventSchema::LegacyGrid,
        }
    }

    fn from_cloud(event: CloudEvent, payload: String) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type,
            subject: event.subject,
            timestamp: event.time,
            payload,
            data: event.data,
            schema: EventSchema::CloudEvent,
        }
    }

    /// Extract the subscription-validation code from the event body.
    ///
    /// Returns `None` when `data` is absent or carries no `validationCode`
    /// string. Absence is the caller's error, not a parse failure.
    pub fn validation_code(&self) -> Option<&str> {
        self.data.as_ref()?.get("validationCode")?.as_str()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while decoding an inbound request body.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Request body is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Event does not match the {schema} envelope: {source}")]
    InvalidEnvelope {
        schema: EventSchema,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Parsing Operations
// ============================================================================

/// Check whether a request body carries a cloud event.
///
/// Attempts to read one JSON object and looks for a non-empty `specversion`
/// string. Any parse failure or absent field yields `false`; this predicate
/// runs on every inbound notification before a parse path is committed to,
/// so it must be cheap and must not fail.
pub fn is_cloud_event(text: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => value
            .get("specversion")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|version| !version.is_empty()),
        Err(_) => false,
    }
}

/// Parse a legacy grid envelope into normalized events.
///
/// A top-level array is decoded element by element; elements that fail to
/// decode are logged and skipped so a partially malformed batch does not
/// discard the whole delivery. A top-level object is decoded as a single
/// event and a decode failure there is an error. Each event keeps the
/// verbatim text of its own element as `payload`.
///
/// Any other top-level JSON value yields an empty sequence.
pub fn parse_grid_events(text: &str) -> Result<Vec<Event>, ParseError> {
    let node: &RawValue = serde_json::from_str(text).map_err(ParseError::InvalidJson)?;
    let trimmed = node.get().trim_start();

    if trimmed.starts_with('[') {
        let elements: Vec<&RawValue> =
            serde_json::from_str(text).map_err(ParseError::InvalidJson)?;

        let mut events = Vec::with_capacity(elements.len());
        for element in elements {
            match serde_json::from_str::<GridEvent>(element.get()) {
                Ok(grid) => events.push(Event::from_grid(grid, element.get().to_string())),
                Err(error) => {
                    warn!(%error, "Skipping malformed event in grid batch");
                }
            }
        }
        return Ok(events);
    }

    if trimmed.starts_with('{') {
        let grid: GridEvent =
            serde_json::from_str(text).map_err(|source| ParseError::InvalidEnvelope {
                schema: EventSchema::LegacyGrid,
                source,
            })?;
        return Ok(vec![Event::from_grid(grid, text.to_string())]);
    }

    // Scalar top-level values are tolerated and carry no events.
    Ok(Vec::new())
}

/// Parse a cloud-event envelope into one normalized event.
///
/// Cloud events are delivered one at a time; the whole request body is the
/// envelope and is retained verbatim as `payload`.
pub fn parse_cloud_event(text: &str) -> Result<Event, ParseError> {
    let cloud: CloudEvent =
        serde_json::from_str(text).map_err(|source| ParseError::InvalidEnvelope {
            schema: EventSchema::CloudEvent,
            source,
        })?;
    Ok(Event::from_cloud(cloud, text.to_string()))
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

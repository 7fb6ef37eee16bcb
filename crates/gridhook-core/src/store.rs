//! # Idempotent Event Store
//!
//! Contract for the durable key-value store events are recorded in, plus an
//! in-memory implementation for tests and self-contained deployments.
//!
//! The provider delivers at-least-once; the store is the deduplication point.
//! Uniqueness is enforced on the composite key (fixed partition, event id)
//! and a conflicting insert surfaces as a distinguishable
//! [`StoreError::Duplicate`] so redelivery can be treated as a no-op.

use crate::event::{Event, EventSchema};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::sync::RwLock;

/// Fixed partition key under which all event rows are stored.
pub const EVENT_PARTITION: &str = "event";

// ============================================================================
// Records
// ============================================================================

/// Persisted projection of an event.
///
/// Created exactly once on the first successful parse and store of an id,
/// never updated and never deleted by this crate. Retention is an external
/// concern.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub partition_key: String,
    pub row_key: String,
    pub subject: String,
    pub event_type: String,
    pub event_time: DateTime<FixedOffset>,
    pub payload: String,
    pub schema: EventSchema,
}

impl EventRecord {
    /// Project an event onto its storage shape.
    pub fn from_event(event: &Event) -> Self {
        Self {
            partition_key: EVENT_PARTITION.to_string(),
            row_key: event.id.clone(),
            subject: event.subject.clone(),
            event_type: event.event_type.clone(),
            event_time: event.timestamp,
            payload: event.payload.clone(),
            schema: event.schema,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by event store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("An event with id '{id}' is already stored")]
    Duplicate { id: String },

    #[error("Store not available: {message}")]
    Unavailable { message: String },

    #[error("Store operation failed: {message}")]
    OperationFailed { message: String },
}

impl StoreError {
    /// Check whether this failure is a redelivered event, recoverable locally.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Check whether the failure may clear on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Duplicate { .. } => false,
            Self::Unavailable { .. } => true,
            Self::OperationFailed { .. } => false,
        }
    }
}

// ============================================================================
// Contract
// ============================================================================

/// Durable keyed storage with create-if-absent semantics.
///
/// Implementations must be safe for concurrent use; `add` is atomic at this
/// boundary — a write that has begun runs to completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a record, rejecting duplicates of the composite key without
    /// corrupting the first insert.
    async fn add(&self, record: EventRecord) -> Result<(), StoreError>;
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// In-memory event store keyed on (partition, row).
///
/// Reference implementation of the store contract; used by unit tests and by
/// self-contained deployments that do not wire a durable table store.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    records: RwLock<HashMap<(String, String), EventRecord>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch a stored record by event id, if present.
    pub fn get(&self, id: &str) -> Option<EventRecord> {
        self.records
            .read()
            .ok()?
            .get(&(EVENT_PARTITION.to_string(), id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn add(&self, record: EventRecord) -> Result<(), StoreError> {
        let key = (record.partition_key.clone(), record.row_key.clone());
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::OperationFailed {
                message: "store lock poisoned".to_string(),
            })?;

        if records.contains_key(&key) {
            return Err(StoreError::Duplicate { id: record.row_key });
        }

        records.insert(key, record);
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

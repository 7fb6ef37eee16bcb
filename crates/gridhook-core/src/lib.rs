//! # Gridhook Core
//!
//! Core business logic for the gridhook event-relay service.
//!
//! This crate contains the domain logic for receiving push notifications from
//! an event-distribution provider, normalizing the two wire formats the
//! provider emits, recording each event exactly once, and fanning events out
//! to real-time subscribers.
//!
//! ## Architecture
//!
//! The core follows clean architecture principles:
//! - Business logic depends only on trait abstractions
//! - Infrastructure implementations are injected at runtime
//! - The durable store and fan-out transport are abstracted behind traits
//!
//! The HTTP surface lives in `gridhook-api`; this crate is pure of HTTP
//! concerns apart from the raw request body text it is handed.

/// Event model and dual-format parser
pub mod event;

/// Idempotent event store contract and in-memory implementation
pub mod store;

/// Bounded exponential backoff retry policy
pub mod retry;

/// Retry-protected fan-out publisher
pub mod publish;

/// Webhook protocol orchestration (classify, store, publish)
pub mod processor;

/// Subscriber-side relay and local broadcast contracts
pub mod relay;

/// In-memory fan-out transport for tests and self-contained deployments
pub mod memory;

// Re-export key types for convenience
pub use event::{
    is_cloud_event, parse_cloud_event, parse_grid_events, CloudEvent, Event, EventSchema,
    GridEvent, ParseError,
};
pub use memory::InMemoryFanout;
pub use processor::{EventProcessor, ProcessingError};
pub use publish::{EventPublisher, FanoutTransport, OutboundEnvelope, PublishError, TransportError};
pub use relay::{
    ChannelBroadcast, FanoutConnection, FanoutListener, LocalBroadcast, LocalMessage, MessageScope,
    RelayError, RelayMessage, SubscriberRelay, RELAY_EVENT_NAME,
};
pub use retry::{RetryPolicy, RetryState};
pub use store::{EventRecord, EventStore, InMemoryEventStore, StoreError, EVENT_PARTITION};

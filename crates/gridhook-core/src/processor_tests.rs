//! Tests for the webhook processing pipeline.

use super::*;
use crate::event::EventSchema;
use crate::publish::{MockFanoutTransport, TransportError};
use crate::retry::RetryPolicy;
use crate::store::{InMemoryEventStore, MockEventStore};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};

fn grid_body(ids: &[&str]) -> String {
    let events: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "eventType": "example.created",
                "subject": format!("widgets/{id}"),
                "eventTime": "2024-03-01T10:15:30Z",
                "data": {"n": 1}
            })
        })
        .collect();
    serde_json::to_string(&events).unwrap()
}

fn processor_with(
    store: Arc<dyn EventStore>,
    transport: Arc<dyn crate::publish::FanoutTransport>,
) -> EventProcessor {
    let publisher = Arc::new(EventPublisher::new(transport, RetryPolicy::default()));
    EventProcessor::new(store, publisher)
}

fn always_ok_transport() -> MockFanoutTransport {
    let mut transport = MockFanoutTransport::new();
    transport.expect_send_to_all().returning(|_, _| Ok(()));
    transport
}

#[tokio::test]
async fn test_subscription_validation_returns_code() {
    let body = json!({
        "id": "validate-1",
        "eventType": "Microsoft.EventGrid.SubscriptionValidationEvent",
        "subject": "",
        "eventTime": "2024-03-01T10:15:30Z",
        "data": {"validationCode": "abc123"}
    })
    .to_string();

    let store = Arc::new(InMemoryEventStore::new());
    let mut transport = MockFanoutTransport::new();
    transport
        .expect_send_to_all()
        .times(1)
        .returning(|_, _| Ok(()));

    let processor = processor_with(store.clone(), Arc::new(transport));
    let code = processor.handle_subscription_validation(&body).await.unwrap();

    assert_eq!(code, "abc123");
    // The validation event is stored exactly once before the echo.
    assert_eq!(store.len(), 1);
    assert!(store.get("validate-1").is_some());
}

#[tokio::test]
async fn test_subscription_validation_without_code_is_client_error() {
    let store = Arc::new(InMemoryEventStore::new());
    let processor = processor_with(store, Arc::new(always_ok_transport()));

    let result = processor
        .handle_subscription_validation(&grid_body(&["evt-1"]))
        .await;

    match result {
        Err(err) => {
            assert!(matches!(err, ProcessingError::MissingValidationCode));
            assert!(err.is_client_error());
        }
        Ok(code) => panic!("expected missing code error, got {:?}", code),
    }
}

#[tokio::test]
async fn test_subscription_validation_parse_failure_is_client_error() {
    let store = Arc::new(InMemoryEventStore::new());
    let processor = processor_with(store, Arc::new(MockFanoutTransport::new()));

    let result = processor.handle_subscription_validation("{{nope").await;
    assert!(matches!(result, Err(ref err) if err.is_client_error()));
}

#[tokio::test]
async fn test_notification_legacy_batch_stores_and_publishes_all() {
    let store = Arc::new(InMemoryEventStore::new());
    let mut transport = MockFanoutTransport::new();
    transport
        .expect_send_to_all()
        .times(3)
        .returning(|_, _| Ok(()));

    let processor = processor_with(store.clone(), Arc::new(transport));
    processor
        .handle_notification(&grid_body(&["evt-1", "evt-2", "evt-3"]))
        .await
        .unwrap();

    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_notification_redelivery_is_swallowed_and_republished() {
    let store = Arc::new(InMemoryEventStore::new());
    let mut transport = MockFanoutTransport::new();
    // Both deliveries publish; the duplicate store is recovered locally.
    transport
        .expect_send_to_all()
        .times(2)
        .returning(|_, _| Ok(()));

    let processor = processor_with(store.clone(), Arc::new(transport));
    let body = grid_body(&["evt-1"]);

    processor.handle_notification(&body).await.unwrap();
    processor.handle_notification(&body).await.unwrap();

    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_notification_batch_survives_single_store_failure() {
    // The 2nd event fails to store with a non-duplicate, non-transient error;
    // events 1 and 3 must still be stored and published.
    let calls = AtomicU32::new(0);
    let mut store = MockEventStore::new();
    store.expect_add().times(3).returning(move |_| {
        if calls.fetch_add(1, Ordering::SeqCst) == 1 {
            Err(StoreError::OperationFailed {
                message: "row rejected".to_string(),
            })
        } else {
            Ok(())
        }
    });

    let mut transport = MockFanoutTransport::new();
    transport
        .expect_send_to_all()
        .times(2)
        .returning(|_, _| Ok(()));

    let processor = processor_with(Arc::new(store), Arc::new(transport));
    let result = processor
        .handle_notification(&grid_body(&["evt-1", "evt-2", "evt-3"]))
        .await;

    // The batch as a whole still succeeds.
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_notification_cloud_event() {
    let body = json!({
        "specversion": "1.0",
        "id": "cloud-1",
        "type": "example.created",
        "source": "/example/source",
        "subject": "widgets/1",
        "time": "2024-03-01T10:15:30Z",
        "data": {"widget": 1}
    })
    .to_string();

    let store = Arc::new(InMemoryEventStore::new());
    let mut transport = MockFanoutTransport::new();
    transport
        .expect_send_to_all()
        .times(1)
        .returning(|_, _| Ok(()));

    let processor = processor_with(store.clone(), Arc::new(transport));
    processor.handle_notification(&body).await.unwrap();

    let record = store.get("cloud-1").unwrap();
    assert_eq!(record.schema, EventSchema::CloudEvent);
    assert_eq!(record.payload, body);
}

#[tokio::test]
async fn test_notification_cloud_parse_failure_is_client_error() {
    // Carries a specversion so it is routed to the cloud path, then fails to
    // decode as a cloud envelope.
    let body = json!({"specversion": "1.0", "id": 7}).to_string();

    let store = Arc::new(InMemoryEventStore::new());
    let processor = processor_with(store, Arc::new(MockFanoutTransport::new()));

    let result = processor.handle_notification(&body).await;
    assert!(matches!(result, Err(ref err) if err.is_client_error()));
}

#[tokio::test]
async fn test_store_failure_fails_single_event_request() {
    let mut store = MockEventStore::new();
    store.expect_add().times(1).returning(|_| {
        Err(StoreError::Unavailable {
            message: "table offline".to_string(),
        })
    });

    let processor = processor_with(Arc::new(store), Arc::new(MockFanoutTransport::new()));
    let body = json!({
        "specversion": "1.0",
        "id": "cloud-1",
        "type": "example.created",
        "time": "2024-03-01T10:15:30Z"
    })
    .to_string();

    let result = processor.handle_notification(&body).await;
    match result {
        Err(ProcessingError::Store(_)) => {}
        other => panic!("expected store error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_publish_retries_do_not_fail_request() {
    let store = Arc::new(InMemoryEventStore::new());
    let mut transport = MockFanoutTransport::new();
    transport.expect_send_to_all().times(3).returning(|_, _| {
        Err(TransportError::Transient {
            message: "hub offline".to_string(),
        })
    });

    let processor = processor_with(store.clone(), Arc::new(transport));
    let body = grid_body(&["evt-1"]);

    processor.handle_notification(&body).await.unwrap();
    // The event is still durably recorded even though the broadcast was
    // abandoned.
    assert_eq!(store.len(), 1);
}

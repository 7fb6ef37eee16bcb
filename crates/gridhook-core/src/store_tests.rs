//! Tests for the idempotent event store.

use super::*;
use crate::event::parse_grid_events;
use serde_json::json;

fn sample_event(id: &str) -> Event {
    let body = json!({
        "id": id,
        "eventType": "example.created",
        "subject": "widgets/1",
        "eventTime": "2024-03-01T10:15:30Z",
        "data": {"n": 1}
    })
    .to_string();

    parse_grid_events(&body).unwrap().remove(0)
}

#[test]
fn test_record_projection() {
    let event = sample_event("evt-1");
    let record = EventRecord::from_event(&event);

    assert_eq!(record.partition_key, EVENT_PARTITION);
    assert_eq!(record.row_key, "evt-1");
    assert_eq!(record.subject, "widgets/1");
    assert_eq!(record.event_type, "example.created");
    assert_eq!(record.schema, EventSchema::LegacyGrid);
    assert_eq!(record.payload, event.payload);
}

#[tokio::test]
async fn test_add_then_duplicate() {
    let store = InMemoryEventStore::new();
    let event = sample_event("evt-1");

    store.add(EventRecord::from_event(&event)).await.unwrap();

    let result = store.add(EventRecord::from_event(&event)).await;
    match result {
        Err(StoreError::Duplicate { id }) => assert_eq!(id, "evt-1"),
        other => panic!("expected duplicate error, got {:?}", other),
    }

    // The first record must survive the conflicting insert untouched.
    assert_eq!(store.len(), 1);
    let stored = store.get("evt-1").unwrap();
    assert_eq!(stored.payload, event.payload);
}

#[tokio::test]
async fn test_distinct_ids_both_stored() {
    let store = InMemoryEventStore::new();

    store
        .add(EventRecord::from_event(&sample_event("evt-1")))
        .await
        .unwrap();
    store
        .add(EventRecord::from_event(&sample_event("evt-2")))
        .await
        .unwrap();

    assert_eq!(store.len(), 2);
    assert!(store.get("evt-1").is_some());
    assert!(store.get("evt-2").is_some());
}

#[test]
fn test_error_classification() {
    let duplicate = StoreError::Duplicate {
        id: "evt-1".to_string(),
    };
    assert!(duplicate.is_duplicate());
    assert!(!duplicate.is_transient());

    let unavailable = StoreError::Unavailable {
        message: "connection refused".to_string(),
    };
    assert!(!unavailable.is_duplicate());
    assert!(unavailable.is_transient());

    let failed = StoreError::OperationFailed {
        message: "bad request".to_string(),
    };
    assert!(!failed.is_duplicate());
    assert!(!failed.is_transient());
}

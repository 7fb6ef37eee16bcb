//! Tests for the event model and dual-format parser.

use super::*;
use serde_json::json;

fn grid_event_json(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "eventType": "Microsoft.Storage.BlobCreated",
        "subject": "/blobServices/default/containers/test/blobs/file.txt",
        "eventTime": "2024-03-01T10:15:30+00:00",
        "data": {"api": "PutBlob"},
        "topic": "/subscriptions/xxx/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/sa"
    })
}

#[test]
fn test_is_cloud_event_with_specversion() {
    let body = json!({
        "specversion": "1.0",
        "id": "evt-1",
        "type": "example.type",
        "source": "/example/source",
        "subject": "example",
        "time": "2024-03-01T10:15:30Z"
    })
    .to_string();

    assert!(is_cloud_event(&body));
}

#[test]
fn test_is_cloud_event_rejects_missing_or_empty_specversion() {
    assert!(!is_cloud_event(&grid_event_json("evt-1").to_string()));
    assert!(!is_cloud_event(&json!({"specversion": ""}).to_string()));
    assert!(!is_cloud_event("not json at all"));
    assert!(!is_cloud_event(""));
}

#[test]
fn test_parse_grid_events_array_in_order() {
    let body = json!([grid_event_json("evt-1"), grid_event_json("evt-2")]).to_string();

    let events = parse_grid_events(&body).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, "evt-1");
    assert_eq!(events[1].id, "evt-2");
    assert_eq!(events[0].schema, EventSchema::LegacyGrid);
    assert_eq!(events[0].event_type, "Microsoft.Storage.BlobCreated");
}

#[test]
fn test_parse_grid_events_skips_malformed_elements() {
    let body = json!([
        grid_event_json("evt-1"),
        {"unrelated": true},
        grid_event_json("evt-3")
    ])
    .to_string();

    let events = parse_grid_events(&body).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, "evt-1");
    assert_eq!(events[1].id, "evt-3");
}

#[test]
fn test_parse_grid_events_single_object() {
    let body = grid_event_json("evt-9").to_string();

    let events = parse_grid_events(&body).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "evt-9");
    // The whole body is the payload for a bare object delivery.
    assert_eq!(events[0].payload, body);
}

#[test]
fn test_parse_grid_events_element_payload_is_verbatim() {
    // Unusual whitespace inside the element must survive into the payload.
    let body = r#"[{"id":"evt-1", "eventType": "t" , "subject":"s","eventTime":"2024-03-01T10:15:30Z"}]"#;

    let events = parse_grid_events(body).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].payload,
        r#"{"id":"evt-1", "eventType": "t" , "subject":"s","eventTime":"2024-03-01T10:15:30Z"}"#
    );
}

#[test]
fn test_parse_grid_events_accepts_pascal_case_fields() {
    let body = json!({
        "Id": "evt-1",
        "EventType": "t",
        "Subject": "s",
        "EventTime": "2024-03-01T10:15:30Z"
    })
    .to_string();

    let events = parse_grid_events(&body).unwrap();
    assert_eq!(events[0].id, "evt-1");
    assert_eq!(events[0].event_type, "t");
}

#[test]
fn test_parse_grid_events_malformed_object_is_error() {
    let result = parse_grid_events(&json!({"id": "evt-1"}).to_string());
    assert!(matches!(
        result,
        Err(ParseError::InvalidEnvelope {
            schema: EventSchema::LegacyGrid,
            ..
        })
    ));
}

#[test]
fn test_parse_grid_events_invalid_json_is_error() {
    assert!(matches!(
        parse_grid_events("{{nope"),
        Err(ParseError::InvalidJson(_))
    ));
}

#[test]
fn test_parse_grid_events_scalar_yields_no_events() {
    let events = parse_grid_events("42").unwrap();
    assert!(events.is_empty());
}

#[test]
fn test_parse_cloud_event() {
    let body = json!({
        "specversion": "1.0",
        "id": "cloud-1",
        "type": "example.created",
        "source": "/example/source",
        "subject": "widgets/1",
        "time": "2024-03-01T10:15:30+02:00",
        "data": {"widget": 1}
    })
    .to_string();

    let event = parse_cloud_event(&body).unwrap();
    assert_eq!(event.id, "cloud-1");
    assert_eq!(event.event_type, "example.created");
    assert_eq!(event.subject, "widgets/1");
    assert_eq!(event.schema, EventSchema::CloudEvent);
    assert_eq!(event.payload, body);
    // Offset must be preserved, not normalized to UTC.
    assert_eq!(event.timestamp.offset().local_minus_utc(), 2 * 3600);
}

#[test]
fn test_parse_cloud_event_failure() {
    assert!(matches!(
        parse_cloud_event(&json!({"specversion": "1.0"}).to_string()),
        Err(ParseError::InvalidEnvelope {
            schema: EventSchema::CloudEvent,
            ..
        })
    ));
}

#[test]
fn test_validation_code_extraction() {
    let body = json!({
        "id": "validate-1",
        "eventType": "Microsoft.EventGrid.SubscriptionValidationEvent",
        "subject": "",
        "eventTime": "2024-03-01T10:15:30Z",
        "data": {"validationCode": "abc123"}
    })
    .to_string();

    let events = parse_grid_events(&body).unwrap();
    assert_eq!(events[0].validation_code(), Some("abc123"));
}

#[test]
fn test_validation_code_absent() {
    let events = parse_grid_events(&grid_event_json("evt-1").to_string()).unwrap();
    assert_eq!(events[0].validation_code(), None);
}

#[test]
fn test_schema_storage_discriminators() {
    assert_eq!(EventSchema::LegacyGrid.as_str(), "eventgrid");
    assert_eq!(EventSchema::CloudEvent.as_str(), "cloudevent");
}

use serde_json::{json, Value};

use truelens::agent::frame::{ensure_request_id, generate_request_id, InboundFrame};
use truelens::AppError;

#[test]
fn parses_a_progress_frame() {
    let frame = InboundFrame::parse(
        r#"{"request_id":"1700000000000-abc1234","event":"log","message":"checking sources"}"#,
    )
    .expect("frame parses");

    assert_eq!(frame.request_id.as_deref(), Some("1700000000000-abc1234"));
    assert_eq!(frame.event_tag(), "log");
    assert_eq!(frame.log_line(), "checking sources");
    assert!(frame.final_output.is_none());
}

#[test]
fn accepts_request_id_aliases() {
    for key in ["request_id", "requestId", "id"] {
        let text = format!(r#"{{"{key}":"r-1","event":"agent_finish"}}"#);
        let frame = InboundFrame::parse(&text).expect("frame parses");
        assert_eq!(frame.request_id.as_deref(), Some("r-1"), "alias {key}");
    }
}

#[test]
fn canonical_spelling_wins_over_aliases() {
    let frame = InboundFrame::parse(r#"{"request_id":"canonical","id":"fallback"}"#)
        .expect("frame parses");
    assert_eq!(frame.request_id.as_deref(), Some("canonical"));
}

#[test]
fn non_string_id_is_ignored() {
    let frame = InboundFrame::parse(r#"{"request_id":42,"event":"log"}"#).expect("frame parses");
    assert!(frame.request_id.is_none());
}

#[test]
fn rejects_invalid_json() {
    let err = InboundFrame::parse("{ nope").expect_err("malformed frame rejected");
    assert!(matches!(err, AppError::Protocol(_)));
}

#[test]
fn rejects_non_object_frames() {
    for text in ["[1,2,3]", "\"hello\"", "42", "null"] {
        let err = InboundFrame::parse(text).expect_err("non-object rejected");
        assert!(matches!(err, AppError::Protocol(_)), "input {text}");
    }
}

#[test]
fn log_line_falls_back_to_compact_frame() {
    let frame = InboundFrame::parse(r#"{"event":"node_start","node":"retrieval"}"#)
        .expect("frame parses");
    let line = frame.log_line();
    assert!(line.contains("node_start"));
    assert!(line.contains("retrieval"));
}

#[test]
fn captures_final_output() {
    let frame = InboundFrame::parse(
        r#"{"request_id":"r-1","event":"node_output","final_output":{"agent_response":"done"}}"#,
    )
    .expect("frame parses");

    assert_eq!(
        frame.final_output,
        Some(json!({"agent_response": "done"}))
    );
}

#[test]
fn generated_ids_have_millis_and_suffix() {
    let id = generate_request_id();
    let (millis, suffix) = id.split_once('-').expect("dash separated");

    assert!(millis.parse::<i64>().is_ok(), "millis prefix: {millis}");
    assert_eq!(suffix.len(), 12);
    assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn generated_ids_do_not_collide() {
    let ids: std::collections::HashSet<String> =
        (0..10_000).map(|_| generate_request_id()).collect();
    assert_eq!(ids.len(), 10_000);
}

#[test]
fn ensure_request_id_injects_when_absent() {
    let mut payload = json!({"new_query": "is this true?"});
    let id = ensure_request_id(&mut payload).expect("id injected");

    assert_eq!(payload.get("request_id").and_then(Value::as_str), Some(id.as_str()));
}

#[test]
fn ensure_request_id_preserves_existing() {
    let mut payload = json!({"request_id": "caller-chosen", "new_query": "q"});
    let id = ensure_request_id(&mut payload).expect("existing id kept");

    assert_eq!(id, "caller-chosen");
    assert_eq!(
        payload.get("request_id").and_then(Value::as_str),
        Some("caller-chosen")
    );
}

#[test]
fn ensure_request_id_rejects_non_objects() {
    let mut payload = json!("just a string");
    let err = ensure_request_id(&mut payload).expect_err("non-object rejected");
    assert!(matches!(err, AppError::Transmit(_)));
}

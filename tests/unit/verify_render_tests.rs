use serde_json::{json, Value};

use truelens::models::message::{Message, Sender};
use truelens::models::verify::{render_verified_results, VerifyRequest, VerifyResponse};

// ── Request construction ─────────────────────────────────────────────────────

#[test]
fn from_transcript_maps_history_roles() {
    let history = vec![
        Message::new("welcome", Sender::Bot),
        Message::new("is the moon landing fake?", Sender::User),
        Message::new("no, it is well documented", Sender::Bot),
    ];

    let request = VerifyRequest::from_transcript(
        "user-1".into(),
        "chat-1".into(),
        &history,
        "what about the flag photo?".into(),
        None,
    );

    let roles: Vec<&str> = request.chat_history.iter().map(|t| t.role.as_str()).collect();
    assert_eq!(roles, ["assistant", "user", "assistant"]);
    assert_eq!(request.new_query, "what about the flag photo?");
    assert!(request.image_mappings.is_empty());
    assert!(request.new_image_paths.is_empty());
}

#[test]
fn from_transcript_threads_image_url() {
    let request = VerifyRequest::from_transcript(
        "user-1".into(),
        "chat-1".into(),
        &[],
        "is this photo real?".into(),
        Some("https://cdn.example.com/uploads/photo.png".into()),
    );

    assert_eq!(request.new_image_paths, ["https://cdn.example.com/uploads/photo.png"]);
    assert_eq!(request.image_mappings.len(), 1);
    assert_eq!(request.image_mappings[0].filename, "photo.png");
}

#[test]
fn request_serializes_invoke_type_as_type() {
    let request = VerifyRequest::from_transcript(
        "user-1".into(),
        String::new(),
        &[],
        "q".into(),
        None,
    );

    let encoded = serde_json::to_value(&request).expect("request encodes");
    assert_eq!(
        encoded.get("type").and_then(Value::as_str),
        Some("invoke_agent")
    );
    assert!(encoded.get("invoke_type").is_none());
}

// ── Response accessors ───────────────────────────────────────────────────────

#[test]
fn agent_response_reads_the_expected_field() {
    let response = VerifyResponse(json!({"agent_response": "looks genuine"}));
    assert_eq!(response.agent_response(), "looks genuine");
}

#[test]
fn agent_response_dumps_body_when_field_missing() {
    let response = VerifyResponse(json!({"unexpected": true}));
    assert!(response.agent_response().contains("unexpected"));
}

#[test]
fn verified_results_requires_non_empty_array() {
    assert!(VerifyResponse(json!({})).verified_results().is_none());
    assert!(VerifyResponse(json!({"verified_results": []}))
        .verified_results()
        .is_none());
    assert!(VerifyResponse(json!({"verified_results": [{"claim": "x"}]}))
        .verified_results()
        .is_some());
}

#[test]
fn agent_logs_reads_merged_lines() {
    let response = VerifyResponse(json!({"agent_logs": ["one", "two"]}));
    assert_eq!(response.agent_logs(), ["one", "two"]);
}

// ── Transcript rendering ─────────────────────────────────────────────────────

#[test]
fn renders_claims_with_classification_and_sources() {
    let results = vec![json!({
        "newly_verified_text_claims": [{
            "claim": "the tower is 500m tall",
            "classification": "false",
            "confidence": 0.92,
            "justification": "official records list 330m",
            "evidence": [
                {"publisher": "FactDesk", "url": "https://factdesk.example.com/a"}
            ]
        }]
    })];

    let rendered = render_verified_results(&results);

    assert!(rendered.starts_with("Verified results:"));
    assert!(rendered.contains("Claim: the tower is 500m tall"));
    assert!(rendered.contains("Classification: false (confidence: 0.92)"));
    assert!(rendered.contains("Justification: official records list 330m"));
    assert!(rendered.contains("FactDesk: https://factdesk.example.com/a"));
}

#[test]
fn renders_result_level_evidence_when_claim_has_none() {
    let results = vec![json!({
        "newly_verified_text_claims": [{
            "claim": "vaccines contain microchips",
            "classification": "false"
        }],
        "evidence": {
            "official_fact_checks": [
                {"publisher": "HealthCheck", "url": "https://health.example.com/fc"}
            ]
        }
    })];

    let rendered = render_verified_results(&results);
    assert!(rendered.contains("HealthCheck: https://health.example.com/fc"));
}

#[test]
fn renders_grounded_summary_and_citations() {
    let results = vec![json!({
        "grounded_ai_summary": "the claim misreads the source",
        "grounded_citations": [
            {"title": "Original study", "url": "https://journal.example.com/s1"}
        ]
    })];

    let rendered = render_verified_results(&results);
    assert!(rendered.contains("Grounded summary: the claim misreads the source"));
    assert!(rendered.contains("Citations:"));
    assert!(rendered.contains("Original study: https://journal.example.com/s1"));
}

#[test]
fn missing_confidence_renders_not_available() {
    let results = vec![json!({
        "newly_verified_text_claims": [{
            "claim": "unclear claim",
            "classification": "unverified"
        }]
    })];

    let rendered = render_verified_results(&results);
    assert!(rendered.contains("(confidence: n/a)"));
}

#[test]
fn empty_results_render_header_only() {
    assert_eq!(render_verified_results(&[]), "Verified results:");
}

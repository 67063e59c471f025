//! HTTP fallback behaviour when the socket path is unavailable.

use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use truelens::agent::{AgentConnection, FallbackTransport, LinkState};
use truelens::AppError;

use super::test_helpers::{serve_http, test_config, ws_listener};

#[tokio::test]
async fn dispatch_before_open_fails_without_waiting() {
    // Listener never accepts, so the handshake never completes.
    let (_listener, url) = ws_listener().await;
    let (connection, _runtime) = AgentConnection::connect(&test_config(&url));

    assert_eq!(connection.state(), LinkState::Connecting);

    let started = std::time::Instant::now();
    let err = connection
        .dispatch(json!({"new_query": "q"}))
        .await
        .expect_err("connecting socket refuses dispatch");

    assert!(matches!(err, AppError::NotConnected(_)));
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "precondition must fail fast, not wait out a timeout"
    );

    connection.shutdown().await;
}

#[tokio::test]
async fn verify_returns_the_response_body() {
    let app = Router::new().route(
        "/verify",
        post(|Json(payload): Json<serde_json::Value>| async move {
            let query = payload
                .get("new_query")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_owned();
            Json(json!({"agent_response": format!("checked: {query}")}))
        }),
    );
    let base = serve_http(app).await;

    let transport = FallbackTransport::new(reqwest::Client::new(), format!("{base}/verify"));
    let body = transport
        .verify(&json!({"new_query": "flat earth"}))
        .await
        .expect("fallback verify succeeds");

    assert_eq!(body.get("agent_response"), Some(&json!("checked: flat earth")));
}

#[tokio::test]
async fn server_error_maps_to_service_issues_message() {
    let app = Router::new().route(
        "/verify",
        post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let base = serve_http(app).await;

    let transport = FallbackTransport::new(reqwest::Client::new(), format!("{base}/verify"));
    let err = transport
        .verify(&json!({}))
        .await
        .expect_err("500 classified");

    let AppError::Fallback(message) = err else {
        panic!("expected a fallback error");
    };
    assert!(message.contains("experiencing issues"));
}

#[tokio::test]
async fn rate_limit_maps_to_too_many_requests_message() {
    let app = Router::new().route("/verify", post(|| async { StatusCode::TOO_MANY_REQUESTS }));
    let base = serve_http(app).await;

    let transport = FallbackTransport::new(reqwest::Client::new(), format!("{base}/verify"));
    let err = transport
        .verify(&json!({}))
        .await
        .expect_err("429 classified");

    let AppError::Fallback(message) = err else {
        panic!("expected a fallback error");
    };
    assert!(message.contains("Too many requests"));
}

#[tokio::test]
async fn other_statuses_map_to_generic_server_error() {
    let app = Router::new().route("/verify", post(|| async { StatusCode::NOT_FOUND }));
    let base = serve_http(app).await;

    let transport = FallbackTransport::new(reqwest::Client::new(), format!("{base}/verify"));
    let err = transport
        .verify(&json!({}))
        .await
        .expect_err("404 classified");

    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn unreachable_service_is_a_fallback_error() {
    let transport =
        FallbackTransport::new(reqwest::Client::new(), "http://127.0.0.1:9/verify".into());
    let err = transport
        .verify(&json!({}))
        .await
        .expect_err("connection refused classified");

    assert!(matches!(err, AppError::Fallback(_)));
    assert!(err.to_string().contains("could not reach"));
}

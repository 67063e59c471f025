//! End-to-end dispatch flows over a scripted agent socket.
//!
//! Covers request-id injection, progress-log accumulation and merge order,
//! out-of-order resolution of concurrent requests, and id-less terminal
//! frames matching the oldest outstanding request.

use std::time::Duration;

use serde_json::{json, Value};

use truelens::agent::AgentConnection;

use super::test_helpers::{accept, recv_json, request_id_of, send_json, test_config, ws_listener};

#[tokio::test]
async fn dispatch_resolves_with_logs_merged_in_order() {
    let (listener, url) = ws_listener().await;
    let (connection, _runtime) = AgentConnection::connect(&test_config(&url));

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let payload = recv_json(&mut ws).await;
        let id = request_id_of(&payload);
        assert_eq!(
            payload.get("new_query").and_then(Value::as_str),
            Some("is this true?")
        );

        send_json(
            &mut ws,
            &json!({"request_id": id, "event": "log", "message": "fetching claims"}),
        )
        .await;
        send_json(
            &mut ws,
            &json!({"request_id": id, "event": "node_start", "message": "scoring evidence"}),
        )
        .await;
        send_json(
            &mut ws,
            &json!({"request_id": id, "event": "agent_finish", "agent_response": "mostly false"}),
        )
        .await;
    });

    connection
        .wait_until_open(Duration::from_secs(2))
        .await
        .expect("socket opens");

    let result = connection
        .dispatch(json!({"new_query": "is this true?"}))
        .await
        .expect("dispatch resolves");

    assert_eq!(
        result.get("agent_response").and_then(Value::as_str),
        Some("mostly false")
    );
    assert_eq!(
        result.get("agent_logs"),
        Some(&json!(["fetching claims", "scoring evidence"]))
    );

    server.await.expect("server task");
    connection.shutdown().await;
}

#[tokio::test]
async fn concurrent_requests_resolve_out_of_order() {
    let (listener, url) = ws_listener().await;
    let (connection, _runtime) = AgentConnection::connect(&test_config(&url));

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let first = recv_json(&mut ws).await;
        let second = recv_json(&mut ws).await;

        // Answer the second request before the first.
        for payload in [&second, &first] {
            let id = request_id_of(payload);
            let marker = payload.get("marker").cloned().unwrap_or_default();
            send_json(
                &mut ws,
                &json!({"request_id": id, "event": "agent_finish", "marker": marker}),
            )
            .await;
        }
    });

    connection
        .wait_until_open(Duration::from_secs(2))
        .await
        .expect("socket opens");

    let (a, b) = tokio::join!(
        connection.dispatch(json!({"marker": "alpha"})),
        connection.dispatch(json!({"marker": "beta"})),
    );

    let a = a.expect("first dispatch resolves");
    let b = b.expect("second dispatch resolves");
    assert_eq!(a.get("marker"), Some(&json!("alpha")));
    assert_eq!(b.get("marker"), Some(&json!("beta")));

    server.await.expect("server task");
    connection.shutdown().await;
}

#[tokio::test]
async fn idless_finish_resolves_oldest_outstanding() {
    let (listener, url) = ws_listener().await;
    let (connection, _runtime) = AgentConnection::connect(&test_config(&url));

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let _payload = recv_json(&mut ws).await;

        send_json(
            &mut ws,
            &json!({"event": "agent_finish", "final_output": {"agent_response": "anonymous"}}),
        )
        .await;
    });

    connection
        .wait_until_open(Duration::from_secs(2))
        .await
        .expect("socket opens");

    let result = connection
        .dispatch(json!({"new_query": "q"}))
        .await
        .expect("dispatch resolves");

    assert_eq!(
        result.get("agent_response").and_then(Value::as_str),
        Some("anonymous")
    );

    server.await.expect("server task");
    connection.shutdown().await;
}

#[tokio::test]
async fn preset_request_ids_are_honoured() {
    let (listener, url) = ws_listener().await;
    let (connection, _runtime) = AgentConnection::connect(&test_config(&url));

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let payload = recv_json(&mut ws).await;
        assert_eq!(request_id_of(&payload), "caller-chosen");

        send_json(
            &mut ws,
            &json!({"request_id": "caller-chosen", "event": "agent_finish", "ok": true}),
        )
        .await;
    });

    connection
        .wait_until_open(Duration::from_secs(2))
        .await
        .expect("socket opens");

    let result = connection
        .dispatch(json!({"request_id": "caller-chosen"}))
        .await
        .expect("dispatch resolves");
    assert_eq!(result.get("ok"), Some(&json!(true)));

    server.await.expect("server task");
    connection.shutdown().await;
}

#[tokio::test]
async fn progress_frames_feed_the_log_broadcast() {
    let (listener, url) = ws_listener().await;
    let (connection, _runtime) = AgentConnection::connect(&test_config(&url));
    let mut log_rx = connection.subscribe_logs();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let payload = recv_json(&mut ws).await;
        let id = request_id_of(&payload);

        send_json(
            &mut ws,
            &json!({"request_id": id, "event": "log", "message": "thinking out loud"}),
        )
        .await;
        send_json(
            &mut ws,
            &json!({"request_id": id, "event": "agent_finish", "agent_response": "done"}),
        )
        .await;
    });

    connection
        .wait_until_open(Duration::from_secs(2))
        .await
        .expect("socket opens");

    connection
        .dispatch(json!({"new_query": "q"}))
        .await
        .expect("dispatch resolves");

    let line = log_rx.recv().await.expect("log line broadcast");
    assert_eq!(line.text, "thinking out loud");
    assert!(line.request_id.is_some());

    server.await.expect("server task");
    connection.shutdown().await;
}

//! Unexpected-close recovery.
//!
//! An unexpected socket drop must keep outstanding requests alive across
//! the reconnect: the retry loop re-establishes the link and a terminal
//! frame arriving on the new socket still resolves the original caller.

use std::time::Duration;

use serde_json::json;

use truelens::agent::{AgentConnection, LinkState};

use super::test_helpers::{accept, recv_json, request_id_of, send_json, test_config, ws_listener};

#[tokio::test]
async fn request_survives_an_unexpected_drop() {
    let (listener, url) = ws_listener().await;
    let (connection, _runtime) = AgentConnection::connect(&test_config(&url));

    let server = tokio::spawn(async move {
        // First connection: take the request, then drop without answering.
        let mut ws = accept(&listener).await;
        let payload = recv_json(&mut ws).await;
        let id = request_id_of(&payload);
        drop(ws);

        // The client reconnects after backoff; answer on the new socket.
        let mut ws = accept(&listener).await;
        send_json(
            &mut ws,
            &json!({"request_id": id, "event": "agent_finish", "agent_response": "recovered"}),
        )
        .await;
        ws
    });

    connection
        .wait_until_open(Duration::from_secs(2))
        .await
        .expect("socket opens");

    let result = connection
        .dispatch(json!({"new_query": "q"}))
        .await
        .expect("request resolves across the reconnect");
    assert_eq!(result.get("agent_response"), Some(&json!("recovered")));

    server.abort();
    connection.shutdown().await;
}

#[tokio::test]
async fn state_cycles_closed_then_open_again() {
    let (listener, url) = ws_listener().await;
    let (connection, _runtime) = AgentConnection::connect(&test_config(&url));

    let server = tokio::spawn(async move {
        let ws = accept(&listener).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(ws);

        // Stay up for the reconnect.
        let ws = accept(&listener).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        ws
    });

    connection
        .wait_until_open(Duration::from_secs(2))
        .await
        .expect("first open");

    let mut states = connection.state_changes();
    let mut saw_closed = false;
    loop {
        tokio::time::timeout(Duration::from_secs(2), states.changed())
            .await
            .expect("state change within deadline")
            .expect("state channel alive");
        match *states.borrow_and_update() {
            LinkState::Closed | LinkState::Connecting => saw_closed = true,
            LinkState::Open => break,
            LinkState::Terminated => panic!("unexpected termination"),
        }
    }
    assert!(saw_closed, "reconnect must pass through a non-open state");

    server.abort();
    connection.shutdown().await;
}

#[tokio::test]
async fn dispatch_while_reconnecting_fails_fast() {
    let (listener, url) = ws_listener().await;
    let (connection, _runtime) = AgentConnection::connect(&test_config(&url));

    let server = tokio::spawn(async move {
        let ws = accept(&listener).await;
        drop(ws);
        // Never accept again; the client loops in backoff.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    connection
        .wait_until_open(Duration::from_secs(2))
        .await
        .expect("first open");

    // Wait for the drop to be observed.
    let mut states = connection.state_changes();
    while *states.borrow_and_update() == LinkState::Open {
        tokio::time::timeout(Duration::from_secs(2), states.changed())
            .await
            .expect("state change within deadline")
            .expect("state channel alive");
    }

    let err = connection
        .dispatch(json!({"new_query": "q"}))
        .await
        .expect_err("dispatch during reconnect fails immediately");
    assert!(matches!(err, truelens::AppError::NotConnected(_)));

    server.abort();
    connection.shutdown().await;
}

//! Integration tests for WebSocket event streaming.
//!
//! Observers connect to `/ws` while learners drive sessions through the
//! HTTP API; every session and availability change must reach them.

mod common;

use std::time::Duration;

use common::*;
use futures::{SinkExt, StreamExt};
use lumi_orchestrator::{LumiEvent, SessionEvent};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use wiremock::MockServer;

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects a WebSocket client to the given URL.
async fn connect_client(url: &str) -> WsClient {
    let (ws_stream, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next text message and parses it as a `LumiEvent`.
/// Automatically answers ping frames.
async fn receive_event(client: &mut WsClient) -> LumiEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Skips events until one with the given name arrives.
async fn receive_named(client: &mut WsClient, name: &str) -> LumiEvent {
    loop {
        let event = receive_event(client).await;
        if event.event_name() == name {
            return event;
        }
    }
}

async fn setup() -> (MockServer, tempfile::TempDir, TestServer) {
    let gemini = MockServer::start().await;
    mount_healthy(&gemini).await;
    let data = tempfile::tempdir().expect("tempdir");
    let server = spawn_server(&gemini, data.path()).await;
    (gemini, data, server)
}

// ============================================================================
// Connection Tests
// ============================================================================

/// Tests that a client receives a connected event with the monitor state.
#[tokio::test]
async fn test_client_receives_connected_event_on_connect() {
    let (_gemini, _data, server) = setup().await;

    let mut client = connect_client(&server.ws_url()).await;
    let event = receive_event(&mut client).await;

    match event {
        LumiEvent::Connected(payload) => {
            assert!(payload.availability.healthy);
            assert_eq!(payload.active_sessions, 0);
        }
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

/// Tests that the connected event counts open sessions.
#[tokio::test]
async fn test_connected_event_counts_sessions() {
    let (_gemini, _data, server) = setup().await;
    let http = reqwest::Client::new();
    start_session(
        &http,
        &server,
        json!({"learnerId": "gil", "topic": "algebra", "level": 1}),
    )
    .await;

    let mut client = connect_client(&server.ws_url()).await;
    match receive_event(&mut client).await {
        LumiEvent::Connected(payload) => assert_eq!(payload.active_sessions, 1),
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

// ============================================================================
// Session Event Tests
// ============================================================================

/// Tests that session events reach every connected observer.
#[tokio::test]
async fn test_session_events_broadcast_to_all_clients() {
    let (_gemini, _data, server) = setup().await;
    let http = reqwest::Client::new();

    let mut client1 = connect_client(&server.ws_url()).await;
    let mut client2 = connect_client(&server.ws_url()).await;
    receive_event(&mut client1).await;
    receive_event(&mut client2).await;

    let view = start_session(
        &http,
        &server,
        json!({"learnerId": "hal", "topic": "algebra", "level": 1}),
    )
    .await;

    for client in [&mut client1, &mut client2] {
        match receive_event(client).await {
            LumiEvent::SessionStarted(payload) => {
                assert_eq!(payload.session_id, view.id);
                assert_eq!(payload.learner_id, "hal");
                assert_eq!(payload.level, 1);
            }
            other => panic!("Expected SessionStarted event, got: {other:?}"),
        }
    }
}

/// Tests that a re-explanation announces its origin before the new state.
#[tokio::test]
async fn test_explanation_ready_precedes_state_change() {
    let (_gemini, _data, server) = setup().await;
    let http = reqwest::Client::new();
    let view = start_session(
        &http,
        &server,
        json!({"learnerId": "ida", "topic": "algebra", "level": 1}),
    )
    .await;

    let mut client = connect_client(&server.ws_url()).await;
    receive_event(&mut client).await;

    apply(&http, &server, &view.id, SessionEvent::ExplainDifferently).await;

    match receive_event(&mut client).await {
        LumiEvent::ExplanationReady(payload) => {
            assert_eq!(payload.session_id, view.id);
            assert!(payload.applied);
            assert!(!payload.is_offline);
        }
        other => panic!("Expected ExplanationReady event, got: {other:?}"),
    }
    match receive_event(&mut client).await {
        LumiEvent::StateChanged(payload) => {
            let explanation = payload.view.explanation.expect("explanation on screen");
            assert_eq!(explanation.text, "Picture a balance scale.");
        }
        other => panic!("Expected StateChanged event, got: {other:?}"),
    }
}

/// Tests that mastering the last level finishes the session.
#[tokio::test]
async fn test_mastering_final_level_finishes_session() {
    let (_gemini, _data, server) = setup().await;
    let http = reqwest::Client::new();
    let view = start_session(
        &http,
        &server,
        json!({"learnerId": "jo", "topic": "geometry", "level": 1}),
    )
    .await;

    let mut client = connect_client(&server.ws_url()).await;
    receive_event(&mut client).await;

    answer_quiz(&http, &server, &view.id, "geometry", 1, true).await;
    let evaluated = apply(
        &http,
        &server,
        &view.id,
        SessionEvent::SubmitFeedback {
            text: "easy".to_string(),
        },
    )
    .await;
    assert_eq!(evaluated["payload"]["evaluation"]["decision"], "NEXT_TOPIC");

    match receive_named(&mut client, "evaluation_ready").await {
        LumiEvent::EvaluationReady(payload) => {
            assert_eq!(payload.session_id, view.id);
            assert!(!payload.is_offline);
        }
        other => panic!("Expected EvaluationReady event, got: {other:?}"),
    }

    let finished = apply(&http, &server, &view.id, SessionEvent::NextTopic).await;
    assert_eq!(finished["payload"]["kind"], "finished");

    match receive_named(&mut client, "session_finished").await {
        LumiEvent::SessionFinished(payload) => {
            assert_eq!(payload.session_id, view.id);
            assert_eq!(payload.learner_id, "jo");
        }
        other => panic!("Expected SessionFinished event, got: {other:?}"),
    }

    let response = http
        .get(server.url(&format!("/api/sessions/{}", view.id)))
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), 404);
}

/// Tests that rejected transitions are reported to observers.
#[tokio::test]
async fn test_invalid_transition_emits_error_event() {
    let (_gemini, _data, server) = setup().await;
    let http = reqwest::Client::new();
    let view = start_session(
        &http,
        &server,
        json!({"learnerId": "kai", "topic": "algebra", "level": 1}),
    )
    .await;

    let mut client = connect_client(&server.ws_url()).await;
    receive_event(&mut client).await;

    let response = post_event(&http, &server, &view.id, &SessionEvent::NextQuestion).await;
    assert_eq!(response.status(), 409);

    match receive_event(&mut client).await {
        LumiEvent::Error(payload) => {
            assert_eq!(payload.session_id.as_deref(), Some(view.id.as_str()));
            assert!(payload.message.contains("NextQuestion"));
        }
        other => panic!("Expected Error event, got: {other:?}"),
    }
}

// ============================================================================
// Availability Tests
// ============================================================================

/// Tests that health flips are relayed in both directions.
#[tokio::test]
async fn test_availability_changes_are_relayed() {
    let (_gemini, _data, server) = setup().await;

    let mut client = connect_client(&server.ws_url()).await;
    receive_event(&mut client).await;

    server.monitor.report_error();
    match receive_event(&mut client).await {
        LumiEvent::AvailabilityChanged(state) => {
            assert!(!state.healthy);
            assert_eq!(state.cooldown_seconds_remaining, 60);
        }
        other => panic!("Expected AvailabilityChanged event, got: {other:?}"),
    }

    server.monitor.report_success();
    match receive_event(&mut client).await {
        LumiEvent::AvailabilityChanged(state) => {
            assert!(state.healthy);
            assert_eq!(state.cooldown_seconds_remaining, 0);
        }
        other => panic!("Expected AvailabilityChanged event, got: {other:?}"),
    }
}

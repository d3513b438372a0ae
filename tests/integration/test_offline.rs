//! Integration tests for degraded operation.
//!
//! The generative service fails in different ways and the learner must
//! still be able to finish a level.

mod common;

use common::*;
use lumi_orchestrator::SessionEvent;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn availability(http: &reqwest::Client, server: &TestServer) -> Value {
    http.get(server.url("/api/availability"))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body")
}

/// Tests that one 503 opens the gate and everything after it resolves
/// locally without touching the network.
#[tokio::test]
async fn test_unavailable_service_degrades_whole_level() {
    let gemini = MockServer::start().await;
    mount_status(&gemini, 503).await;
    let data = tempfile::tempdir().expect("tempdir");
    let server = spawn_server(&gemini, data.path()).await;
    let http = reqwest::Client::new();

    let view = start_session(
        &http,
        &server,
        json!({"learnerId": "eve", "topic": "algebra", "level": 1}),
    )
    .await;
    let welcome = view.welcome.expect("welcome resolved");
    assert!(welcome.is_offline);
    assert!(!welcome.explanation.trim().is_empty());

    let state = availability(&http, &server).await;
    assert_eq!(state["healthy"], false);
    assert_eq!(state["cooldownSecondsRemaining"], 60);

    let explained = apply(&http, &server, &view.id, SessionEvent::ExplainDifferently).await;
    assert_eq!(explained["payload"]["result"]["origin"], "OFFLINE_FALLBACK");
    assert_eq!(explained["view"]["explanation"]["isOffline"], true);

    answer_quiz(&http, &server, &view.id, "algebra", 1, true).await;
    let evaluated = apply(
        &http,
        &server,
        &view.id,
        SessionEvent::SubmitFeedback {
            text: "good".to_string(),
        },
    )
    .await;
    assert_eq!(evaluated["payload"]["evaluation"]["isOffline"], true);
    assert_eq!(evaluated["payload"]["evaluation"]["decision"], "NEXT_LEVEL");

    // Only the welcome ever reached the service.
    let calls = gemini.received_requests().await.unwrap_or_default().len();
    assert_eq!(calls, 1);

    // The level still counts.
    let progress: Value = http
        .get(server.url("/api/learners/eve/progress"))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(progress["topics"]["algebra"], 1);
}

/// Tests that a successful probe reopens the gate.
#[tokio::test]
async fn test_recovery_after_success() {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:generateContent")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&gemini)
        .await;
    mount_healthy(&gemini).await;
    let data = tempfile::tempdir().expect("tempdir");
    let server = spawn_server(&gemini, data.path()).await;
    let http = reqwest::Client::new();

    let view = start_session(
        &http,
        &server,
        json!({"learnerId": "fay", "topic": "algebra", "level": 1}),
    )
    .await;
    assert!(view.welcome.expect("welcome resolved").is_offline);

    let gated = apply(&http, &server, &view.id, SessionEvent::ExplainDifferently).await;
    assert_eq!(gated["payload"]["result"]["origin"], "OFFLINE_FALLBACK");

    server.monitor.report_success();
    assert_eq!(availability(&http, &server).await["healthy"], true);

    let fresh = apply(&http, &server, &view.id, SessionEvent::ExplainDifferently).await;
    assert_eq!(fresh["payload"]["result"]["origin"], "GENERATED");
    assert_eq!(fresh["view"]["explanation"]["isOffline"], false);
}

/// Tests that rate limiting retries up to the attempt budget, then falls
/// back and cools down.
#[tokio::test]
async fn test_rate_limit_exhausts_attempts() {
    let gemini = MockServer::start().await;
    mount_status(&gemini, 429).await;
    let data = tempfile::tempdir().expect("tempdir");
    let server = spawn_server(&gemini, data.path()).await;
    let http = reqwest::Client::new();

    let resolved: Value = http
        .post(server.url("/api/content/resolve"))
        .json(&json!({"topic": "astronomy", "level": 1, "style": "VISUAL"}))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(resolved["origin"], "OFFLINE_FALLBACK");
    assert_eq!(resolved["isOffline"], true);

    assert_eq!(requests_containing(&gemini, EXPLAIN_PROMPT).await, 2);
    assert_eq!(availability(&http, &server).await["healthy"], false);
}

/// Tests that an offline answer is never cached.
#[tokio::test]
async fn test_offline_answers_are_not_cached() {
    let gemini = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:generateContent")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&gemini)
        .await;
    mount_healthy(&gemini).await;
    let data = tempfile::tempdir().expect("tempdir");
    let server = spawn_server(&gemini, data.path()).await;
    let http = reqwest::Client::new();

    let request = json!({
        "topic": "astronomy",
        "level": 2,
        "mode": "EXPLAIN",
        "sourceText": "Why do stars twinkle?"
    });
    let first: Value = http
        .post(server.url("/api/content/resolve"))
        .json(&request)
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(first["origin"], "OFFLINE_FALLBACK");

    server.monitor.report_success();
    let second: Value = http
        .post(server.url("/api/content/resolve"))
        .json(&request)
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(second["origin"], "GENERATED");
    assert_eq!(second["explanation"], "Picture a balance scale.");
}

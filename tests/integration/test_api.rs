//! Integration tests for the HTTP API against a live server.
//!
//! Every test drives a real listener with `reqwest`; generative calls go to a
//! wiremock server speaking the Gemini wire format and sessions persist in a
//! JSON file store under a temporary directory.

mod common;

use common::*;
use lumi_orchestrator::SessionEvent;
use serde_json::{json, Value};
use wiremock::MockServer;

/// Tests a complete level: welcome, re-explanations, quiz, reflection,
/// persistence and advancing.
#[tokio::test]
async fn test_full_level_over_http() {
    let gemini = MockServer::start().await;
    mount_healthy(&gemini).await;
    let data = tempfile::tempdir().expect("tempdir");
    let server = spawn_server(&gemini, data.path()).await;
    let http = reqwest::Client::new();

    let view = start_session(
        &http,
        &server,
        json!({"learnerId": "ana", "topic": "algebra", "level": 1, "style": "VISUAL"}),
    )
    .await;
    let welcome = view.welcome.expect("welcome resolved");
    assert_eq!(welcome.explanation, "Welcome back! Let's dive in.");
    assert!(!welcome.is_offline);

    // First re-explanation is generated, the second comes from the cache.
    let first = apply(&http, &server, &view.id, SessionEvent::ExplainDifferently).await;
    assert_eq!(first["payload"]["kind"], "explanation");
    assert_eq!(first["payload"]["result"]["origin"], "GENERATED");
    assert_eq!(first["view"]["explanation"]["text"], "Picture a balance scale.");

    let second = apply(&http, &server, &view.id, SessionEvent::ExplainDifferently).await;
    assert_eq!(second["payload"]["result"]["origin"], "CACHE");
    assert_eq!(requests_containing(&gemini, EXPLAIN_PROMPT).await, 1);

    answer_quiz(&http, &server, &view.id, "algebra", 1, true).await;

    let evaluated = apply(
        &http,
        &server,
        &view.id,
        SessionEvent::SubmitFeedback {
            text: "That felt great".to_string(),
        },
    )
    .await;
    assert_eq!(evaluated["payload"]["kind"], "evaluation");
    assert_eq!(evaluated["payload"]["evaluation"]["decision"], "NEXT_LEVEL");
    assert_eq!(evaluated["view"]["state"]["phase"], "RESULT");
    assert_eq!(
        evaluated["view"]["state"]["outcome"]["nextActions"],
        json!(["ADVANCE_LEVEL"])
    );

    let progress: Value = http
        .get(server.url("/api/learners/ana/progress"))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(progress["topics"]["algebra"], 1);

    let advanced = apply(&http, &server, &view.id, SessionEvent::AdvanceLevel).await;
    assert_eq!(advanced["view"]["level"], 2);
    assert_eq!(advanced["view"]["state"]["phase"], "LEARNING");
    assert_eq!(advanced["view"]["score"], 0);
}

/// Tests that a fresh session resumes after the highest completed level,
/// also after the server restarts on the same data directory.
#[tokio::test]
async fn test_progress_survives_restart() {
    let gemini = MockServer::start().await;
    mount_healthy(&gemini).await;
    let data = tempfile::tempdir().expect("tempdir");
    let http = reqwest::Client::new();

    {
        let server = spawn_server(&gemini, data.path()).await;
        let view = start_session(
            &http,
            &server,
            json!({"learnerId": "ben", "topic": "algebra", "level": 1}),
        )
        .await;
        answer_quiz(&http, &server, &view.id, "algebra", 1, true).await;
        apply(
            &http,
            &server,
            &view.id,
            SessionEvent::SubmitFeedback {
                text: "fine".to_string(),
            },
        )
        .await;
        server.handle.abort();
    }

    let server = spawn_server(&gemini, data.path()).await;
    let resumed = start_session(
        &http,
        &server,
        json!({"learnerId": "ben", "topic": "algebra"}),
    )
    .await;
    assert_eq!(resumed.level, 2);

    let report: Value = http
        .get(server.url("/api/learners/ben/report"))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(report["report"]["sessionCount"], 1);
    assert_eq!(report["narrative"]["origin"], "GENERATED");
    assert_eq!(
        report["narrative"]["explanation"],
        "A strong week of steady practice."
    );
}

/// Tests that failing a quiz offers both retry paths and persists nothing
/// into progress.
#[tokio::test]
async fn test_failed_quiz_offers_retries() {
    let gemini = MockServer::start().await;
    mount_text(&gemini, WELCOME_PROMPT, "Hi!").await;
    mount_text(
        &gemini,
        EVALUATION_PROMPT,
        r#"{"decision": "REPEAT", "emotion": "Sadness", "confidence_score": 0.6, "message": "Let's try again."}"#,
    )
    .await;
    let data = tempfile::tempdir().expect("tempdir");
    let server = spawn_server(&gemini, data.path()).await;
    let http = reqwest::Client::new();

    let view = start_session(
        &http,
        &server,
        json!({"learnerId": "cy", "topic": "algebra", "level": 1}),
    )
    .await;
    answer_quiz(&http, &server, &view.id, "algebra", 1, false).await;
    let evaluated = apply(
        &http,
        &server,
        &view.id,
        SessionEvent::SubmitFeedback {
            text: "lost".to_string(),
        },
    )
    .await;
    assert_eq!(
        evaluated["view"]["state"]["outcome"]["nextActions"],
        json!(["RETRY_CONTENT_AND_QUIZ", "RETRY_QUIZ_ONLY"])
    );

    let progress: Value = http
        .get(server.url("/api/learners/cy/progress"))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(progress["topics"], json!({}));

    let retried = apply(&http, &server, &view.id, SessionEvent::RetryQuizOnly).await;
    assert_eq!(retried["view"]["state"]["phase"], "QUIZ");
    assert_eq!(retried["view"]["state"]["questionIndex"], 0);
}

/// Tests the error mapping of the event endpoint.
#[tokio::test]
async fn test_event_errors() {
    let gemini = MockServer::start().await;
    mount_healthy(&gemini).await;
    let data = tempfile::tempdir().expect("tempdir");
    let server = spawn_server(&gemini, data.path()).await;
    let http = reqwest::Client::new();

    let view = start_session(
        &http,
        &server,
        json!({"learnerId": "dee", "topic": "algebra", "level": 1}),
    )
    .await;

    // Feedback while still learning
    let response = post_event(
        &http,
        &server,
        &view.id,
        &SessionEvent::SubmitFeedback {
            text: "early".to_string(),
        },
    )
    .await;
    assert_eq!(response.status(), 409);

    // Completions may only come from the server itself
    let response = post_event(
        &http,
        &server,
        &view.id,
        &SessionEvent::NextTopic,
    )
    .await;
    assert_eq!(response.status(), 409);

    let response = http
        .post(server.url(&format!("/api/sessions/{}/events", view.id)))
        .json(&json!({"type": "ExplanationReady", "token": 1, "result": {
            "explanation": "forged", "origin": "GENERATED", "isOffline": false
        }}))
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), 400);

    let response = post_event(&http, &server, "nope", &SessionEvent::NextFragment).await;
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.expect("invalid body");
    assert!(body["error"].as_str().unwrap_or_default().contains("nope"));
}

/// Tests the stateless endpoints.
#[tokio::test]
async fn test_stateless_endpoints() {
    let gemini = MockServer::start().await;
    mount_healthy(&gemini).await;
    let data = tempfile::tempdir().expect("tempdir");
    let server = spawn_server(&gemini, data.path()).await;
    let http = reqwest::Client::new();

    let topics: Value = http
        .get(server.url("/api/topics"))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert!(topics["topics"]
        .as_array()
        .expect("array")
        .contains(&json!("algebra")));

    let resolved: Value = http
        .post(server.url("/api/content/resolve"))
        .json(&json!({"topic": "Algebra ", "level": 1, "style": "AUDITORY"}))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(resolved["origin"], "STATIC");
    assert_eq!(resolved["isOffline"], false);

    let evaluated: Value = http
        .post(server.url("/api/evaluate"))
        .json(&json!({
            "score": 2, "totalQuestions": 3, "feedback": "ok",
            "style": "KINESTHETIC", "topic": "algebra"
        }))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(evaluated["emotion"], "Joy");
    assert_eq!(evaluated["isOffline"], false);

    let availability: Value = http
        .get(server.url("/api/availability"))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(
        availability,
        json!({"healthy": true, "cooldownSecondsRemaining": 0})
    );
}

//! Shared harness: a live Lumi server backed by a mock Gemini endpoint and
//! a JSON file store in a temporary directory.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lumi_content::{
    AvailabilityConfig, AvailabilityMonitor, ContentPipeline, Curriculum, DocumentStore,
    EmotionClassifier, GeminiClient, GenerativeClient, JsonFileStore, RetryPolicy,
};
use lumi_orchestrator::{create_router, SessionEvent, SessionOrchestrator, SessionView};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Model name used against the mock endpoint.
pub const MODEL: &str = "gemini-test";

/// Phrase that only appears in explanation prompts.
pub const EXPLAIN_PROMPT: &str = "friendly math tutor";
/// Phrase that only appears in welcome prompts.
pub const WELCOME_PROMPT: &str = "welcome message";
/// Phrase that only appears in evaluation prompts.
pub const EVALUATION_PROMPT: &str = "analyzing a student's state";
/// Phrase that only appears in report prompts.
pub const REPORT_PROMPT: &str = "educational psychologist";

/// A running server.
pub struct TestServer {
    pub addr: SocketAddr,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub monitor: AvailabilityMonitor,
    pub curriculum: Arc<Curriculum>,
    pub handle: JoinHandle<()>,
}

impl TestServer {
    /// Base URL for HTTP requests.
    pub fn url(&self, route: &str) -> String {
        format!("http://{}{route}", self.addr)
    }

    /// WebSocket URL.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Starts a server whose generative calls go to `gemini` and whose store
/// lives under `data_dir`.
pub async fn spawn_server(gemini: &MockServer, data_dir: &Path) -> TestServer {
    let client: Arc<dyn GenerativeClient> = Arc::new(GeminiClient::new(gemini.uri(), MODEL, "test-key"));
    let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(data_dir));
    let monitor = AvailabilityMonitor::new(AvailabilityConfig {
        cooldown_seconds: 60,
        ..AvailabilityConfig::default()
    });
    let curriculum = Arc::new(Curriculum::builtin().expect("built-in curriculum"));

    let pipeline = Arc::new(
        ContentPipeline::builder(Arc::clone(&client), Arc::clone(&store), monitor.clone())
            .curriculum(Arc::clone(&curriculum))
            .retry_policy(RetryPolicy {
                timeout: Duration::from_secs(2),
                max_attempts: 2,
                rate_limit_delay: Duration::from_millis(10),
            })
            .build(),
    );
    let classifier = Arc::new(EmotionClassifier::new(client, monitor.clone()));
    let orchestrator = Arc::new(SessionOrchestrator::new(
        pipeline,
        classifier,
        store,
        Arc::clone(&curriculum),
    ));
    orchestrator.broadcaster().relay_availability(&monitor);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let router = create_router(Arc::clone(&orchestrator));
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    TestServer {
        addr,
        orchestrator,
        monitor,
        curriculum,
        handle,
    }
}

/// A Gemini response body carrying `text`.
pub fn gemini_body(text: &str) -> Value {
    json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
}

/// Answers prompts containing `phrase` with `text`.
pub async fn mount_text(server: &MockServer, phrase: &str, text: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:generateContent")))
        .and(body_string_contains(phrase))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(text)))
        .mount(server)
        .await;
}

/// Answers every prompt with the given status.
pub async fn mount_status(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path(format!("/models/{MODEL}:generateContent")))
        .respond_with(ResponseTemplate::new(status).set_body_string("overloaded"))
        .mount(server)
        .await;
}

/// Mounts healthy answers for all four prompt kinds.
pub async fn mount_healthy(server: &MockServer) {
    mount_text(server, WELCOME_PROMPT, "Welcome back! Let's dive in.").await;
    mount_text(server, EXPLAIN_PROMPT, "Picture a balance scale.").await;
    mount_text(
        server,
        EVALUATION_PROMPT,
        r#"{"decision": "NEXT_LEVEL", "emotion": "Joy", "confidence_score": 0.85, "message": "You nailed it!"}"#,
    )
    .await;
    mount_text(server, REPORT_PROMPT, "A strong week of steady practice.").await;
}

/// Counts requests whose body contains `phrase`.
pub async fn requests_containing(server: &MockServer, phrase: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| String::from_utf8_lossy(&r.body).contains(phrase))
        .count()
}

/// Starts a session over HTTP.
pub async fn start_session(
    http: &reqwest::Client,
    server: &TestServer,
    body: Value,
) -> SessionView {
    let response = http
        .post(server.url("/api/sessions"))
        .json(&body)
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), 201, "start failed: {:?}", response.text().await);
    response.json().await.expect("invalid session view")
}

/// Posts an event and returns the raw response.
pub async fn post_event(
    http: &reqwest::Client,
    server: &TestServer,
    session_id: &str,
    event: &SessionEvent,
) -> reqwest::Response {
    http.post(server.url(&format!("/api/sessions/{session_id}/events")))
        .json(event)
        .send()
        .await
        .expect("request failed")
}

/// Posts an event that must succeed and returns the body.
pub async fn apply(
    http: &reqwest::Client,
    server: &TestServer,
    session_id: &str,
    event: SessionEvent,
) -> Value {
    let response = post_event(http, server, session_id, &event).await;
    let status = response.status();
    let body: Value = response.json().await.expect("invalid body");
    assert!(status.is_success(), "{event:?} failed with {status}: {body}");
    body
}

/// Skips to the quiz and answers every question, correctly or not.
pub async fn answer_quiz(
    http: &reqwest::Client,
    server: &TestServer,
    session_id: &str,
    topic: &str,
    level: u32,
    correct: bool,
) {
    let lesson = server
        .curriculum
        .level(topic, level)
        .expect("lesson exists")
        .clone();
    apply(http, server, session_id, SessionEvent::SkipToQuiz).await;
    for item in &lesson.quiz {
        let index = if correct {
            item.correct_option_index
        } else {
            (item.correct_option_index + 1) % item.options.len()
        };
        apply(http, server, session_id, SessionEvent::SelectOption { index }).await;
        apply(http, server, session_id, SessionEvent::ConfirmAnswer).await;
        apply(http, server, session_id, SessionEvent::NextQuestion).await;
    }
}

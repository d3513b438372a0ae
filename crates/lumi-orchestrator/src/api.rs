//! HTTP API for learners and clients.
//!
//! # Endpoints
//!
//! - `POST /api/content/resolve` - Resolve an explanation, welcome or report
//! - `POST /api/evaluate` - Classify a finished session
//! - `GET /api/availability` - Generative service health
//! - `GET /api/topics` - Topics in the curriculum
//! - `POST /api/sessions` - Start a session
//! - `GET /api/sessions/:id` - Current session view
//! - `POST /api/sessions/:id/events` - Apply a learner event
//! - `GET /api/learners/:id/progress` - Highest completed level per topic
//! - `GET /api/learners/:id/report` - Progress report (`?format=markdown`)
//! - `GET /ws` - Event stream
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumi_orchestrator::{create_router, SessionOrchestrator};
//!
//! # async fn example(orchestrator: SessionOrchestrator) {
//! let router = create_router(Arc::new(orchestrator));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lumi_content::{
    AvailabilityState, ContentError, ContentRequest, EvaluationInput, EvaluationResult,
    ResolutionResult,
};
use lumi_report::MarkdownGenerator;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::error::LumiError;
use crate::orchestrator::{Advance, SessionOrchestrator, StartSession};
use crate::record::LearnerProgress;
use crate::session::{SessionEvent, SessionView};
use crate::websocket::{ws_handler, LumiEvent};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

/// Response body for `GET /api/topics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsResponse {
    /// Canonical topic names.
    pub topics: Vec<String>,
}

/// Query for the report endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    /// `json` (default) or `markdown`.
    #[serde(default)]
    pub format: Option<String>,
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The request body or learner input was rejected.
    BadRequest(String),
    /// The session or lesson does not exist.
    NotFound(String),
    /// The session is not in a phase that accepts the event.
    Conflict(String),
    /// Anything else.
    Internal(String),
}

impl From<LumiError> for ApiError {
    fn from(err: LumiError) -> Self {
        let message = err.to_string();
        match err {
            LumiError::Validation { .. }
            | LumiError::Content(ContentError::InvalidRequest(_)) => Self::BadRequest(message),
            LumiError::SessionNotFound { .. } | LumiError::LessonNotFound { .. } => {
                Self::NotFound(message)
            }
            LumiError::InvalidStateTransition { .. } => Self::Conflict(message),
            _ => Self::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(msg) => {
                warn!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

/// Parses a JSON body, reporting type errors as 400 rather than axum's 422.
fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router.
///
/// All API routes live under `/api`; the event stream is at `/ws`. CORS is
/// open for browser clients and every request is traced.
pub fn create_router(orchestrator: Arc<SessionOrchestrator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/content/resolve", post(handle_resolve))
        .route("/evaluate", post(handle_evaluate))
        .route("/availability", get(handle_availability))
        .route("/topics", get(handle_topics))
        .route("/sessions", post(handle_start_session))
        .route("/sessions/:id", get(handle_get_session))
        .route("/sessions/:id/events", post(handle_session_event))
        .route("/learners/:id/progress", get(handle_progress))
        .route("/learners/:id/report", get(handle_report));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(orchestrator)
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /api/content/resolve`.
async fn handle_resolve(
    State(orchestrator): State<Arc<SessionOrchestrator>>,
    Json(body): Json<Value>,
) -> Result<Json<ResolutionResult>, ApiError> {
    let request: ContentRequest = parse_body(body)?;
    info!(
        topic = %request.topic(),
        level = request.level(),
        style = %request.style(),
        mode = %request.mode(),
        "Resolving content"
    );
    Ok(Json(orchestrator.resolve_content(&request).await))
}

/// Handler for `POST /api/evaluate`.
async fn handle_evaluate(
    State(orchestrator): State<Arc<SessionOrchestrator>>,
    Json(body): Json<Value>,
) -> Result<Json<EvaluationResult>, ApiError> {
    let input: EvaluationInput = parse_body(body)?;
    if input.score > input.total_questions {
        return Err(ApiError::BadRequest(format!(
            "score {} exceeds totalQuestions {}",
            input.score, input.total_questions
        )));
    }
    if input.feedback.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Tell us in a few words how this session felt before continuing".to_string(),
        ));
    }
    Ok(Json(orchestrator.classify(&input).await))
}

/// Handler for `GET /api/availability`.
async fn handle_availability(
    State(orchestrator): State<Arc<SessionOrchestrator>>,
) -> Json<AvailabilityState> {
    Json(orchestrator.availability())
}

/// Handler for `GET /api/topics`.
async fn handle_topics(State(orchestrator): State<Arc<SessionOrchestrator>>) -> Json<TopicsResponse> {
    Json(TopicsResponse {
        topics: orchestrator.topics(),
    })
}

/// Handler for `POST /api/sessions`.
async fn handle_start_session(
    State(orchestrator): State<Arc<SessionOrchestrator>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let start: StartSession = parse_body(body)?;
    let view = orchestrator.start_session(start).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Handler for `GET /api/sessions/:id`.
async fn handle_get_session(
    State(orchestrator): State<Arc<SessionOrchestrator>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(orchestrator.session(&id).await?))
}

/// Handler for `POST /api/sessions/:id/events`.
async fn handle_session_event(
    State(orchestrator): State<Arc<SessionOrchestrator>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Advance>, ApiError> {
    let event: SessionEvent = parse_body(body)?;
    match orchestrator.advance(&id, event).await {
        Ok(advance) => Ok(Json(advance)),
        Err(e) => {
            if !e.is_user_facing() {
                orchestrator
                    .broadcaster()
                    .send(LumiEvent::error(Some(id.clone()), e.to_string()));
            }
            Err(e.into())
        }
    }
}

/// Handler for `GET /api/learners/:id/progress`.
async fn handle_progress(
    State(orchestrator): State<Arc<SessionOrchestrator>>,
    Path(learner_id): Path<String>,
) -> Result<Json<LearnerProgress>, ApiError> {
    Ok(Json(orchestrator.progress(&learner_id).await?))
}

/// Handler for `GET /api/learners/:id/report`.
async fn handle_report(
    State(orchestrator): State<Arc<SessionOrchestrator>>,
    Path(learner_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, ApiError> {
    let report = orchestrator.learner_report(&learner_id).await?;
    match query.format.as_deref() {
        None | Some("json") => Ok(Json(report).into_response()),
        Some("markdown" | "md") => {
            let markdown = MarkdownGenerator::new(&report.report).generate();
            Ok((
                [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
                markdown,
            )
                .into_response())
        }
        Some(other) => Err(ApiError::BadRequest(format!(
            "Unknown report format '{other}'; use json or markdown"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request},
    };
    use lumi_content::generative::MockClient;
    use lumi_content::{
        AvailabilityMonitor, ContentPipeline, Curriculum, EmotionClassifier, GenerativeClient,
        MemoryStore, Origin,
    };
    use tower::util::ServiceExt;

    use super::*;
    use crate::orchestrator::AdvancePayload;
    use crate::session::SessionState;

    fn router_with(client: MockClient) -> Router {
        let client: Arc<dyn GenerativeClient> = Arc::new(client);
        let store = Arc::new(MemoryStore::new());
        let monitor = AvailabilityMonitor::default();
        let curriculum = Arc::new(Curriculum::builtin().unwrap());
        let pipeline = ContentPipeline::builder(Arc::clone(&client), store.clone(), monitor.clone())
            .curriculum(Arc::clone(&curriculum))
            .build();
        let classifier = EmotionClassifier::new(client, monitor);
        let orchestrator = SessionOrchestrator::new(
            Arc::new(pipeline),
            Arc::new(classifier),
            store,
            curriculum,
        );
        create_router(Arc::new(orchestrator))
    }

    fn router() -> Router {
        router_with(MockClient::new("A fresh explanation"))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json<T: DeserializeOwned>(response: Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn start_session(router: &Router) -> SessionView {
        let response = router
            .clone()
            .oneshot(post_json(
                "/api/sessions",
                r#"{"learnerId": "ana", "topic": "algebra", "level": 1, "style": "VISUAL"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    // ------------------------------------------------------------------------
    // Content endpoints
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_resolve_static_content() {
        let response = router()
            .oneshot(post_json(
                "/api/content/resolve",
                r#"{"topic": "algebra", "level": 1, "style": "VISUAL"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result: ResolutionResult = body_json(response).await;
        assert_eq!(result.origin, Origin::Static);
        assert!(!result.is_offline);
    }

    #[tokio::test]
    async fn test_resolve_rejects_zero_level() {
        let response = router()
            .oneshot(post_json(
                "/api/content/resolve",
                r#"{"topic": "algebra", "level": 0}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = body_json(response).await;
        assert!(error.error.contains("level"));
    }

    #[tokio::test]
    async fn test_invalid_json_returns_400() {
        let response = router()
            .oneshot(post_json("/api/content/resolve", "{ invalid json }"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_evaluate_endpoint() {
        let router = router_with(MockClient::new(
            r#"{"decision": "NEXT_LEVEL", "emotion": "Trust", "confidence_score": 0.7, "message": "Nice"}"#,
        ));
        let response = router
            .oneshot(post_json(
                "/api/evaluate",
                r#"{"score": 4, "totalQuestions": 5, "feedback": "easy", "style": "AUDITORY", "topic": "algebra"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result: EvaluationResult = body_json(response).await;
        assert_eq!(result.message, "Nice");
        assert!(!result.is_offline);
    }

    #[tokio::test]
    async fn test_evaluate_rejects_impossible_score() {
        let response = router()
            .oneshot(post_json(
                "/api/evaluate",
                r#"{"score": 6, "totalQuestions": 5, "feedback": "x", "style": "VISUAL", "topic": "algebra"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_availability_endpoint() {
        let response = router().oneshot(get_req("/api/availability")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let state: AvailabilityState = body_json(response).await;
        assert!(state.healthy);
        assert_eq!(state.cooldown_seconds_remaining, 0);
    }

    #[tokio::test]
    async fn test_topics_endpoint() {
        let response = router().oneshot(get_req("/api/topics")).await.unwrap();
        let topics: TopicsResponse = body_json(response).await;
        assert!(topics.topics.iter().any(|t| t == "algebra"));
    }

    // ------------------------------------------------------------------------
    // Session endpoints
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_start_and_fetch_session() {
        let router = router();
        let view = start_session(&router).await;
        assert_eq!(view.state, SessionState::Learning { fragment_index: 0 });
        assert!(view.welcome.is_some());

        let response = router
            .oneshot(get_req(&format!("/api/sessions/{}", view.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched: SessionView = body_json(response).await;
        assert_eq!(fetched.id, view.id);
    }

    #[tokio::test]
    async fn test_unknown_session_returns_404() {
        let response = router()
            .oneshot(get_req("/api/sessions/missing"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_lesson_returns_404() {
        let response = router()
            .oneshot(post_json(
                "/api/sessions",
                r#"{"learnerId": "ana", "topic": "algebra", "level": 42}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_explain_event_returns_payload() {
        let router = router();
        let view = start_session(&router).await;
        let response = router
            .oneshot(post_json(
                &format!("/api/sessions/{}/events", view.id),
                r#"{"type": "ExplainDifferently"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let advance: Advance = body_json(response).await;
        assert!(matches!(
            advance.payload,
            Some(AdvancePayload::Explanation { applied: true, .. })
        ));
        assert_eq!(advance.view.explanation.unwrap().text, "A fresh explanation");
    }

    #[tokio::test]
    async fn test_validation_error_returns_400() {
        let router = router();
        let view = start_session(&router).await;
        let uri = format!("/api/sessions/{}/events", view.id);
        router
            .clone()
            .oneshot(post_json(&uri, r#"{"type": "SkipToQuiz"}"#))
            .await
            .unwrap();

        let response = router
            .oneshot(post_json(&uri, r#"{"type": "ConfirmAnswer"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = body_json(response).await;
        assert_eq!(error.error, "Choose an answer before confirming");
    }

    #[tokio::test]
    async fn test_invalid_transition_returns_409() {
        let router = router();
        let view = start_session(&router).await;
        let response = router
            .oneshot(post_json(
                &format!("/api/sessions/{}/events", view.id),
                r#"{"type": "SubmitFeedback", "text": "too early"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_event_type_returns_400() {
        let router = router();
        let view = start_session(&router).await;
        let response = router
            .oneshot(post_json(
                &format!("/api/sessions/{}/events", view.id),
                r#"{"type": "Teleport"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ------------------------------------------------------------------------
    // Learner endpoints
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_progress_for_new_learner_is_empty() {
        let response = router()
            .oneshot(get_req("/api/learners/newbie/progress"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let progress: LearnerProgress = body_json(response).await;
        assert_eq!(progress.learner_id, "newbie");
        assert!(progress.topics.is_empty());
    }

    #[tokio::test]
    async fn test_report_json_and_markdown() {
        let router = router_with(MockClient::new("Keep it up."));
        let response = router
            .clone()
            .oneshot(get_req("/api/learners/ana/report"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = body_json(response).await;
        assert_eq!(json["report"]["sessionCount"], 0);
        assert_eq!(json["narrative"]["explanation"], "Keep it up.");

        let response = router
            .clone()
            .oneshot(get_req("/api/learners/ana/report?format=markdown"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/markdown; charset=utf-8"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("# Lumi Progress Report: ana"));

        let response = router
            .oneshot(get_req("/api/learners/ana/report?format=pdf"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ------------------------------------------------------------------------
    // Router
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_cors_headers_present() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/availability")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_success() || response.status() == StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_unknown_route_returns_404() {
        let response = router().oneshot(get_req("/api/unknown")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

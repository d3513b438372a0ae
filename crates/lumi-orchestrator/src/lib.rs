//! Lumi Session Orchestrator
//!
//! Drives learning sessions over the content core and exposes them through
//! an HTTP API and a WebSocket event stream.

pub mod api;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod record;
pub mod session;
pub mod websocket;

pub use api::{create_router, ErrorResponse, ReportQuery, TopicsResponse};
pub use config::{
    AvailabilitySettings, CacheSettings, Config, GenerativeConfig, Provider, ServerConfig,
};
pub use error::{LumiError, Result};
pub use orchestrator::{Advance, AdvancePayload, LearnerReport, SessionOrchestrator, StartSession};
pub use record::{
    sessions_collection, AnswerRecord, LearnerProgress, ProgressUpdate, SessionRecord,
    PROGRESS_COLLECTION, SESSIONS_COLLECTION,
};
pub use session::{
    transition, Command, ExplanationView, FragmentView, Lesson, NextAction, Nudge, QuestionView,
    ResultOutcome, Session, SessionEvent, SessionState, SessionView, DEFAULT_MASTERY_THRESHOLD,
};
pub use websocket::{ws_handler, EventBroadcaster, LumiEvent};

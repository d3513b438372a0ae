//! Error types for the Lumi orchestrator.
//!
//! Covers configuration loading, session lookup and transitions, learner
//! input validation, and failures bubbling up from the content crate.

use std::path::PathBuf;

use lumi_content::ContentError;
use lumi_report::ReportError;

/// A specialized `Result` type for orchestrator operations.
pub type Result<T> = std::result::Result<T, LumiError>;

/// Errors that can occur while driving a learning session.
///
/// Variants are grouped by subsystem and carry a suggestion where the caller
/// can do something about it.
#[derive(Debug, thiserror::Error)]
pub enum LumiError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your lumi.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Learner Input Errors
    // ========================================================================
    /// Input from the learner was rejected. The only error shown to learners.
    #[error("{message}")]
    Validation {
        /// Field or action that failed.
        field: String,
        /// Human-readable reason.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// No session exists with the given id.
    #[error("Session not found: '{id}'\n\nSuggestion: Start a new session with POST /api/sessions")]
    SessionNotFound {
        /// The unknown session id.
        id: String,
    },

    /// The curriculum has no lesson for the requested topic and level.
    #[error("Lesson not found: {topic} level {level}\n\nSuggestion: Pick a topic and level listed in the curriculum")]
    LessonNotFound {
        /// Requested topic.
        topic: String,
        /// Requested level.
        level: u32,
    },

    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot apply {event} in {from}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The rejected event.
        event: String,
    },

    // ========================================================================
    // Content Errors
    // ========================================================================
    /// Curriculum or store failure from the content crate.
    #[error(transparent)]
    Content(#[from] ContentError),

    /// Stored history could not be turned into a report.
    #[error(transparent)]
    Report(#[from] ReportError),

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LumiError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a new `SessionNotFound` error.
    #[must_use]
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { id: id.into() }
    }

    /// Creates a new `LessonNotFound` error.
    #[must_use]
    pub fn lesson_not_found(topic: impl Into<String>, level: u32) -> Self {
        Self::LessonNotFound {
            topic: topic.into(),
            level,
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, event: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            event: event.to_string(),
        }
    }

    /// Returns `true` if the message may be shown to the learner as-is.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns `true` if this error should stop the process at startup.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. } | Self::ConfigValidationError { .. }
        )
    }
}

//! Lumi Content Resolution
//!
//! Resolves styled explanations for a learner through an ordered set of
//! tiers (cache, static curriculum, generative service, offline fallback),
//! and tracks the health of the generative service with a shared
//! [`AvailabilityMonitor`].
//!
//! The external collaborators (document store, generative client) are
//! traits so the pipeline can run against in-memory doubles in tests.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod availability;
pub mod cache;
pub mod curriculum;
pub mod evaluate;
pub mod fallback;
pub mod generative;
pub mod pipeline;
pub mod prompt;
pub mod store;

pub use availability::{AvailabilityConfig, AvailabilityMonitor, AvailabilityState, HealthProbe, MonitorStatus};
pub use cache::{CacheEntry, CacheKey, CacheValidity};
pub use curriculum::{Curriculum, CurriculumLevel, Fragment, QuizItem};
pub use evaluate::{Decision, Emotion, EmotionClassifier, EvaluationInput, EvaluationResult};
pub use fallback::FallbackStore;
pub use generative::{
    CompletionRequest, CompletionResponse, GeminiClient, GenerationSettings, GenerativeClient,
    GenerativeError, OfflineClient,
};
pub use pipeline::{ContentPipeline, ResolveOptions, ResolveStrategy, RetryPolicy};
pub use store::{DocumentStore, JsonFileStore, MemoryStore};

/// A specialized `Result` type for content operations.
pub type Result<T> = std::result::Result<T, ContentError>;

/// Errors that can occur while loading content or talking to the store.
///
/// Generative failures are not part of this enum: they are absorbed by the
/// pipeline and only ever show up as an offline result.
#[derive(Debug, Error)]
pub enum ContentError {
    /// A content request failed validation.
    #[error("invalid content request: {0}")]
    InvalidRequest(String),

    /// The document store rejected a read or write.
    #[error("document store error in '{collection}': {message}")]
    Store {
        /// Collection the operation targeted.
        collection: String,
        /// Description of the failure.
        message: String,
    },

    /// Curriculum file was not found.
    #[error("curriculum not found: '{path}'")]
    CurriculumNotFound {
        /// Path where the curriculum was expected.
        path: PathBuf,
    },

    /// Curriculum file exceeds the size limit.
    #[error("curriculum exceeds size limit (1MB): '{path}' is {size_kb}KB")]
    CurriculumTooLarge {
        /// Path to the oversized file.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Curriculum file is not valid UTF-8.
    #[error("curriculum has invalid encoding: '{path}'")]
    CurriculumEncoding {
        /// Path to the file.
        path: PathBuf,
    },

    /// Curriculum content violates an invariant (e.g. a quiz answer index).
    #[error("invalid curriculum: {0}")]
    InvalidCurriculum(String),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ContentError {
    /// Creates a new `Store` error.
    #[must_use]
    pub fn store(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            collection: collection.into(),
            message: message.into(),
        }
    }
}

/// Content variant tag chosen per learner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningStyle {
    /// Imagery, diagrams and layout.
    Visual,
    /// Narrative, spoken-word flow.
    Auditory,
    /// Action, simulation and practice.
    Kinesthetic,
    /// No preference.
    #[default]
    Default,
}

impl LearningStyle {
    /// Returns the persisted tag for this style.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Visual => "VISUAL",
            Self::Auditory => "AUDITORY",
            Self::Kinesthetic => "KINESTHETIC",
            Self::Default => "DEFAULT",
        }
    }
}

impl std::fmt::Display for LearningStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of text a request asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentMode {
    /// Explain a concept (or re-explain a fragment).
    #[default]
    Explain,
    /// Short welcome at the start of a level.
    Welcome,
    /// Narrative summary of a learner's progress.
    Report,
}

impl ContentMode {
    /// Returns the persisted tag for this mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Explain => "EXPLAIN",
            Self::Welcome => "WELCOME",
            Self::Report => "REPORT",
        }
    }
}

impl std::fmt::Display for ContentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, immutable request for content.
///
/// # Example
///
/// ```
/// use lumi_content::{ContentMode, ContentRequest, LearningStyle};
///
/// let request = ContentRequest::new("algebra", 2, LearningStyle::Visual, ContentMode::Explain)
///     .unwrap()
///     .with_source("Solve 2x + 5 = 13", Some("alg-2-1".to_string()));
/// assert_eq!(request.level(), 2);
/// assert_eq!(request.source_fragment_id(), Some("alg-2-1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawContentRequest")]
pub struct ContentRequest {
    topic: String,
    level: u32,
    style: LearningStyle,
    mode: ContentMode,
    source_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_fragment_id: Option<String>,
}

impl ContentRequest {
    /// Creates a request without source text.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::InvalidRequest` if the topic is blank or the
    /// level is zero.
    pub fn new(
        topic: impl Into<String>,
        level: u32,
        style: LearningStyle,
        mode: ContentMode,
    ) -> Result<Self> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(ContentError::InvalidRequest(
                "topic must not be empty".to_string(),
            ));
        }
        if level == 0 {
            return Err(ContentError::InvalidRequest(
                "level must be a positive integer".to_string(),
            ));
        }
        Ok(Self {
            topic,
            level,
            style,
            mode,
            source_text: String::new(),
            source_fragment_id: None,
        })
    }

    /// Attaches the text to explain and the fragment it came from.
    #[must_use]
    pub fn with_source(mut self, text: impl Into<String>, fragment_id: Option<String>) -> Self {
        self.source_text = text.into();
        self.source_fragment_id = fragment_id;
        self
    }

    /// Topic as supplied by the caller.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Curriculum level (1-based).
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Learning style variant.
    pub const fn style(&self) -> LearningStyle {
        self.style
    }

    /// Requested mode.
    pub const fn mode(&self) -> ContentMode {
        self.mode
    }

    /// Free text to explain; empty when not applicable.
    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    /// Fragment the source text belongs to, if any.
    pub fn source_fragment_id(&self) -> Option<&str> {
        self.source_fragment_id.as_deref()
    }

    /// Returns `true` for a re-explanation of learner-supplied text.
    pub fn is_free_text_explain(&self) -> bool {
        self.mode == ContentMode::Explain && !self.source_text.trim().is_empty()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContentRequest {
    topic: String,
    level: u32,
    #[serde(default)]
    style: LearningStyle,
    #[serde(default)]
    mode: ContentMode,
    #[serde(default)]
    source_text: String,
    #[serde(default)]
    source_fragment_id: Option<String>,
}

impl TryFrom<RawContentRequest> for ContentRequest {
    type Error = ContentError;

    fn try_from(raw: RawContentRequest) -> Result<Self> {
        Ok(Self::new(raw.topic, raw.level, raw.style, raw.mode)?
            .with_source(raw.source_text, raw.source_fragment_id))
    }
}

/// Which tier produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    /// Served from the shared cache.
    Cache,
    /// Authored curriculum content.
    Static,
    /// Fresh output from the generative service.
    Generated,
    /// Canned content used because every other tier failed.
    OfflineFallback,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Static => write!(f, "static"),
            Self::Generated => write!(f, "generated"),
            Self::OfflineFallback => write!(f, "offline_fallback"),
        }
    }
}

/// The outcome of resolving a [`ContentRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    /// Explanation text, never empty.
    pub explanation: String,
    /// Tier that produced the text.
    pub origin: Origin,
    /// `true` when the learner is seeing degraded content.
    pub is_offline: bool,
}

impl ResolutionResult {
    /// A result served from cache.
    #[must_use]
    pub fn cached(explanation: impl Into<String>) -> Self {
        Self {
            explanation: explanation.into(),
            origin: Origin::Cache,
            is_offline: false,
        }
    }

    /// A result taken from the authored curriculum.
    #[must_use]
    pub fn authored(explanation: impl Into<String>) -> Self {
        Self {
            explanation: explanation.into(),
            origin: Origin::Static,
            is_offline: false,
        }
    }

    /// A fresh generative result.
    #[must_use]
    pub fn generated(explanation: impl Into<String>) -> Self {
        Self {
            explanation: explanation.into(),
            origin: Origin::Generated,
            is_offline: false,
        }
    }

    /// A degraded result from the fallback store.
    #[must_use]
    pub fn offline(explanation: impl Into<String>) -> Self {
        Self {
            explanation: explanation.into(),
            origin: Origin::OfflineFallback,
            is_offline: true,
        }
    }
}

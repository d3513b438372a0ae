//! Generative completion collaborator.
//!
//! The pipeline talks to the remote text service only through
//! [`GenerativeClient`]:
//! - [`GeminiClient`] calls the Gemini `generateContent` endpoint
//! - [`OfflineClient`] always reports the service as unavailable
//! - [`MockClient`] replays scripted outcomes for tests

pub mod gemini;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use gemini::GeminiClient;
pub use mock::MockClient;

/// Default completion length budget.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1000;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Failures of a generative call, tagged so callers can pick a retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerativeError {
    /// The service asked us to slow down.
    #[error("rate limited by generative service")]
    RateLimited,

    /// The call did not finish within the hard bound.
    #[error("generative call timed out after {after_ms}ms")]
    Timeout {
        /// Bound that was exceeded, in milliseconds.
        after_ms: u64,
    },

    /// The service answered but the payload could not be used.
    #[error("malformed generative response: {0}")]
    Malformed(String),

    /// The service could not be reached or reported itself unavailable.
    #[error("generative service unavailable: {message}")]
    Unavailable {
        /// HTTP status when the service answered (e.g. 503).
        status: Option<u16>,
        /// Description of the failure.
        message: String,
    },

    /// The service refused the request (auth, bad request, ...).
    #[error("generative request rejected (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status returned.
        status: u16,
        /// Response body or description.
        message: String,
    },
}

impl GenerativeError {
    /// Creates an `Unavailable` error for a transport failure.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Unavailable {
            status: None,
            message: message.into(),
        }
    }

    /// Returns `true` for an explicit throttling signal.
    #[must_use]
    pub const fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    /// Returns `true` when the service itself said it is down (HTTP 503).
    #[must_use]
    pub const fn is_service_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable {
                status: Some(503),
                ..
            }
        )
    }

    /// Short machine-readable tag used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Timeout { .. } => "timeout",
            Self::Malformed(_) => "malformed",
            Self::Unavailable { .. } => "unavailable",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Sampling parameters shared by every request a pipeline issues.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// A single completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    /// Fully rendered prompt.
    pub prompt_text: String,
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl CompletionRequest {
    /// Builds a request from a prompt and shared settings.
    #[must_use]
    pub fn new(prompt_text: impl Into<String>, settings: GenerationSettings) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            max_output_tokens: settings.max_output_tokens,
            temperature: settings.temperature,
        }
    }
}

/// Text returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CompletionResponse {
    /// Generated text.
    pub text: String,
}

/// Remote text generation.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Short identifier for logs (model name or client kind).
    fn id(&self) -> &str;

    /// Issues one completion. Implementations must not retry internally.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, GenerativeError>;
}

/// Client used when no generative backend is configured.
///
/// Every call fails with `Unavailable`, which sends the pipeline straight to
/// its offline tier.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineClient;

#[async_trait]
impl GenerativeClient for OfflineClient {
    fn id(&self) -> &str {
        "offline"
    }

    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, GenerativeError> {
        Err(GenerativeError::network("no generative backend configured"))
    }
}

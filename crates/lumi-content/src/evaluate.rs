//! Session-end emotion classification.
//!
//! One generative call turns the quiz score and the learner's reflection into
//! an [`EvaluationResult`]. Any failure falls back to a local rule so the
//! caller always gets a decision.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time;
use tracing::{debug, warn};

use crate::availability::AvailabilityMonitor;
use crate::generative::{CompletionRequest, GenerationSettings, GenerativeClient, GenerativeError};
use crate::pipeline::DEFAULT_TIMEOUT;
use crate::{prompt, LearningStyle};

/// Passing ratio for the local fallback decision.
const LOCAL_PASS_RATIO: f64 = 0.5;

#[allow(clippy::unwrap_used)]
static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json|JSON)?\s*(.*?)\s*```\s*$").unwrap());

/// What the learner should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Move on to the next level of the topic.
    NextLevel,
    /// Repeat the current level.
    Repeat,
    /// Step back to simpler material.
    EasierContent,
    /// The topic is mastered; pick another one.
    NextTopic,
}

impl Decision {
    /// Returns the persisted tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NextLevel => "NEXT_LEVEL",
            Self::Repeat => "REPEAT",
            Self::EasierContent => "EASIER_CONTENT",
            Self::NextTopic => "NEXT_TOPIC",
        }
    }

    /// Returns `true` for decisions that let the learner progress.
    #[must_use]
    pub const fn is_passing(&self) -> bool {
        matches!(self, Self::NextLevel | Self::NextTopic)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plutchik's eight basic emotions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Emotion {
    /// Joy.
    Joy,
    /// Trust.
    Trust,
    /// Fear.
    Fear,
    /// Surprise.
    Surprise,
    /// Sadness.
    Sadness,
    /// Disgust.
    Disgust,
    /// Anger.
    Anger,
    /// Anticipation.
    Anticipation,
}

impl Emotion {
    /// All emotions in wheel order.
    pub const ALL: [Self; 8] = [
        Self::Joy,
        Self::Trust,
        Self::Fear,
        Self::Surprise,
        Self::Sadness,
        Self::Disgust,
        Self::Anger,
        Self::Anticipation,
    ];

    /// Maps a free-form label to an emotion. Unknown labels are `Anticipation`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "joy" => Self::Joy,
            "trust" => Self::Trust,
            "fear" => Self::Fear,
            "surprise" => Self::Surprise,
            "sadness" | "sad" => Self::Sadness,
            "disgust" => Self::Disgust,
            "anger" => Self::Anger,
            _ => Self::Anticipation,
        }
    }

    /// Fear, sadness, disgust and surprise count as anxious.
    #[must_use]
    pub const fn is_anxious(&self) -> bool {
        matches!(
            self,
            Self::Fear | Self::Sadness | Self::Disgust | Self::Surprise
        )
    }

    /// Display label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Joy => "Joy",
            Self::Trust => "Trust",
            Self::Fear => "Fear",
            Self::Surprise => "Surprise",
            Self::Sadness => "Sadness",
            Self::Disgust => "Disgust",
            Self::Anger => "Anger",
            Self::Anticipation => "Anticipation",
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to [`EmotionClassifier::classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationInput {
    /// Correct answers.
    pub score: u32,
    /// Questions in the quiz.
    pub total_questions: u32,
    /// The learner's reflection.
    pub feedback: String,
    /// Learning style.
    #[serde(default)]
    pub style: LearningStyle,
    /// Topic studied.
    pub topic: String,
}

impl EvaluationInput {
    /// Fraction of correct answers; zero for an empty quiz.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.total_questions == 0 {
            0.0
        } else {
            f64::from(self.score) / f64::from(self.total_questions)
        }
    }
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Next step.
    pub decision: Decision,
    /// Dominant emotion.
    pub emotion: Emotion,
    /// Classifier confidence in `[0, 1]`.
    pub confidence_score: f64,
    /// Short message for the learner.
    pub message: String,
    /// `true` when the local fallback produced this result.
    pub is_offline: bool,
}

impl EvaluationResult {
    /// The local rule used whenever the service cannot answer.
    #[must_use]
    pub fn local(input: &EvaluationInput) -> Self {
        let decision = if input.ratio() < LOCAL_PASS_RATIO {
            Decision::Repeat
        } else {
            Decision::NextLevel
        };
        let message = match decision {
            Decision::Repeat => format!(
                "You got {} of {} on {}. Let's go through this level once more; every pass makes it clearer.",
                input.score,
                input.total_questions,
                input.topic.trim()
            ),
            _ => format!(
                "Nice work, {} of {} on {}! You're ready for the next step.",
                input.score,
                input.total_questions,
                input.topic.trim()
            ),
        };
        Self {
            decision,
            emotion: Emotion::Anticipation,
            confidence_score: 0.0,
            message,
            is_offline: true,
        }
    }
}

#[derive(Deserialize)]
struct RawEvaluation {
    decision: Decision,
    #[serde(default)]
    emotion: String,
    #[serde(default, alias = "confidenceScore")]
    confidence_score: f64,
    #[serde(default)]
    message: String,
}

/// Removes a surrounding Markdown code fence, if any.
pub fn strip_fence(text: &str) -> &str {
    JSON_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or_else(|| text.trim(), |m| m.as_str())
}

/// Parses a service answer into a result.
///
/// # Errors
///
/// Returns `GenerativeError::Malformed` if the text is not the expected JSON.
pub fn parse_evaluation(text: &str) -> Result<EvaluationResult, GenerativeError> {
    let raw: RawEvaluation = serde_json::from_str(strip_fence(text))
        .map_err(|e| GenerativeError::Malformed(e.to_string()))?;
    let confidence_score = if raw.confidence_score.is_finite() {
        raw.confidence_score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    Ok(EvaluationResult {
        decision: raw.decision,
        emotion: Emotion::from_label(&raw.emotion),
        confidence_score,
        message: raw.message.trim().to_string(),
        is_offline: false,
    })
}

/// Classifies a finished session through the generative service.
pub struct EmotionClassifier {
    client: Arc<dyn GenerativeClient>,
    monitor: AvailabilityMonitor,
    timeout: Duration,
    settings: GenerationSettings,
}

impl EmotionClassifier {
    /// Creates a classifier with the default timeout.
    pub fn new(client: Arc<dyn GenerativeClient>, monitor: AvailabilityMonitor) -> Self {
        Self {
            client,
            monitor,
            timeout: DEFAULT_TIMEOUT,
            settings: GenerationSettings::default(),
        }
    }

    /// Overrides the call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the sampling parameters.
    #[must_use]
    pub const fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Classifies a session. Never fails.
    pub async fn classify(&self, input: &EvaluationInput) -> EvaluationResult {
        if !self.monitor.is_ready() {
            debug!("Generative service cooling down; using local evaluation");
            return EvaluationResult::local(input);
        }

        match self.call(input).await {
            Ok(result) => {
                self.monitor.report_success();
                result
            }
            Err(e) => {
                if e.is_rate_limit() || e.is_service_unavailable() {
                    self.monitor.report_error();
                }
                warn!(error = %e, kind = e.kind(), "Evaluation failed; using local evaluation");
                EvaluationResult::local(input)
            }
        }
    }

    async fn call(&self, input: &EvaluationInput) -> Result<EvaluationResult, GenerativeError> {
        let prompt = prompt::build_evaluation_prompt(
            input.score,
            input.total_questions,
            &input.feedback,
            input.style,
            &input.topic,
        );
        let response = time::timeout(
            self.timeout,
            self.client.complete(CompletionRequest::new(prompt, self.settings)),
        )
        .await
        .map_err(|_| GenerativeError::Timeout {
            after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        })??;
        parse_evaluation(&response.text)
    }
}

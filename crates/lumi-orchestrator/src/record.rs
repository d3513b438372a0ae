//! Persisted documents: session history and learner progress.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lumi_content::{Decision, Emotion, LearningStyle};
use serde::{Deserialize, Serialize};

/// Collection prefix for session history (`sessions/{learnerId}`).
pub const SESSIONS_COLLECTION: &str = "sessions";

/// Collection holding one progress document per learner.
pub const PROGRESS_COLLECTION: &str = "progress";

/// Returns the history collection of a learner.
pub fn sessions_collection(learner_id: &str) -> String {
    format!("{SESSIONS_COLLECTION}/{learner_id}")
}

/// The learner's answer to one quiz question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    /// Option the learner locked in.
    pub selected_option: usize,
    /// Whether it was the correct option.
    pub correct: bool,
}

/// Summary of one finished learning session. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// When the learner submitted feedback.
    pub timestamp: DateTime<Utc>,
    /// Learner the session belongs to.
    pub learner_id: String,
    /// Topic studied.
    pub topic: String,
    /// Level studied.
    pub level: u32,
    /// Correct answers.
    pub score: u32,
    /// Questions asked.
    pub total_questions: u32,
    /// Progression decision after any mastery override.
    pub decision: Decision,
    /// Classified emotion.
    pub emotion: Emotion,
    /// Classifier confidence.
    pub confidence_score: f64,
    /// Style the content was served in.
    pub learning_style: LearningStyle,
    /// Seconds from level start to feedback.
    pub duration_seconds: u64,
    /// The learner's reflection.
    pub feedback: String,
    /// Answers keyed by question index.
    #[serde(default)]
    pub answers: BTreeMap<usize, AnswerRecord>,
}

/// Highest level completed per topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerProgress {
    /// Learner id.
    pub learner_id: String,
    /// Topic name to highest completed level.
    #[serde(default)]
    pub topics: BTreeMap<String, u32>,
    /// Last update.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl LearnerProgress {
    /// Creates an empty progress document.
    #[must_use]
    pub fn new(learner_id: impl Into<String>) -> Self {
        Self {
            learner_id: learner_id.into(),
            topics: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Records a completed level. Never lowers the stored level.
    pub fn record_completion(&mut self, topic: &str, level: u32) {
        let entry = self.topics.entry(topic.to_string()).or_insert(0);
        *entry = (*entry).max(level);
        self.updated_at = Utc::now();
    }
}

/// A progress change produced at the end of a passing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Topic completed at `level`.
    pub topic: String,
    /// Completed level.
    pub level: u32,
}

impl From<&SessionRecord> for lumi_report::SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            topic: record.topic.clone(),
            level: record.level,
            score: record.score,
            total_questions: record.total_questions,
            decision: record.decision.as_str().to_string(),
            emotion: record.emotion.as_str().to_string(),
            confidence_score: record.confidence_score,
            learning_style: record.learning_style.as_str().to_string(),
            duration_seconds: record.duration_seconds,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord {
            timestamp: Utc::now(),
            learner_id: "ana".to_string(),
            topic: "algebra".to_string(),
            level: 2,
            score: 2,
            total_questions: 2,
            decision: Decision::NextLevel,
            emotion: Emotion::Joy,
            confidence_score: 0.9,
            learning_style: LearningStyle::Kinesthetic,
            duration_seconds: 300,
            feedback: "fun".to_string(),
            answers: BTreeMap::from([(
                0,
                AnswerRecord {
                    selected_option: 1,
                    correct: true,
                },
            )]),
        }
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["learnerId"], "ana");
        assert_eq!(json["decision"], "NEXT_LEVEL");
        assert_eq!(json["emotion"], "Joy");
        assert_eq!(json["learningStyle"], "KINESTHETIC");
        assert_eq!(json["answers"]["0"]["selectedOption"], 1);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut progress = LearnerProgress::new("ana");
        progress.record_completion("algebra", 3);
        progress.record_completion("algebra", 2);
        assert_eq!(progress.topics["algebra"], 3);
    }

    #[test]
    fn test_summary_conversion() {
        let summary = lumi_report::SessionSummary::from(&record());
        assert_eq!(summary.decision, "NEXT_LEVEL");
        assert_eq!(summary.learning_style, "KINESTHETIC");
        assert_eq!(summary.emotion, "Joy");
    }

    #[test]
    fn test_sessions_collection() {
        assert_eq!(sessions_collection("ana"), "sessions/ana");
    }
}

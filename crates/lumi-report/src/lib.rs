//! Lumi Progress Reports
//!
//! Turns a learner's finished sessions into progress analytics: experience
//! points, study streak, per-topic mastery, emotion distribution and a
//! seven-day trend. Reports serialize to JSON for programmatic access or
//! render to Markdown for parents and teachers.
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - compact or pretty JSON
//! - [`MarkdownGenerator`] - human-readable Markdown
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use lumi_report::{ProgressReport, SessionSummary};
//! use lumi_report::json::JsonGenerator;
//!
//! let sessions = vec![SessionSummary {
//!     timestamp: Utc::now(),
//!     topic: "algebra".to_string(),
//!     level: 1,
//!     score: 4,
//!     total_questions: 5,
//!     decision: "NEXT_LEVEL".to_string(),
//!     emotion: "Joy".to_string(),
//!     confidence_score: 0.9,
//!     learning_style: "VISUAL".to_string(),
//!     duration_seconds: 600,
//! }];
//!
//! let report = ProgressReport::from_sessions("ana", &sessions, Utc::now()).unwrap();
//! assert_eq!(report.xp, 90);
//! let json = JsonGenerator::new(&report).generate_pretty().unwrap();
//! assert!(json.contains("\"xp\": 90"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Scoring constants
// ============================================================================

/// XP per correct answer.
pub const XP_PER_CORRECT_ANSWER: u32 = 10;

/// XP bonus for a session that unlocked the next level.
pub const XP_LEVEL_UP_BONUS: u32 = 50;

/// XP bonus for kinesthetic sessions.
pub const XP_KINESTHETIC_BONUS: u32 = 20;

/// Levels that make up a complete topic.
pub const LEVELS_PER_TOPIC: u32 = 5;

/// Days covered by the trend.
pub const TREND_DAYS: u32 = 7;

/// Emotion labels in wheel order. Ties for the dominant emotion go to the
/// earlier label.
pub const EMOTIONS: [&str; 8] = [
    "Joy",
    "Trust",
    "Fear",
    "Surprise",
    "Sadness",
    "Disgust",
    "Anger",
    "Anticipation",
];

// ============================================================================
// Input
// ============================================================================

/// One finished session, as the report sees it.
///
/// Labels are plain strings so that history written by older clients (for
/// example `"Happy"` instead of `"Joy"`) still parses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// When the session finished.
    pub timestamp: DateTime<Utc>,
    /// Topic studied.
    pub topic: String,
    /// Level studied.
    pub level: u32,
    /// Correct answers.
    pub score: u32,
    /// Questions asked.
    pub total_questions: u32,
    /// Progression decision tag, e.g. `NEXT_LEVEL`.
    pub decision: String,
    /// Emotion label.
    pub emotion: String,
    /// Classifier confidence.
    pub confidence_score: f64,
    /// Learning style tag, e.g. `KINESTHETIC`.
    pub learning_style: String,
    /// Time spent in the session.
    #[serde(default)]
    pub duration_seconds: u64,
}

impl SessionSummary {
    /// Returns `true` if the session completed its level.
    pub fn completed_level(&self) -> bool {
        matches!(self.decision.as_str(), "NEXT_LEVEL" | "NEXT_TOPIC")
    }

    /// XP earned by this session.
    pub fn xp(&self) -> u32 {
        let mut xp = self.score.saturating_mul(XP_PER_CORRECT_ANSWER);
        if self.decision == "NEXT_LEVEL" {
            xp = xp.saturating_add(XP_LEVEL_UP_BONUS);
        }
        if self.learning_style.eq_ignore_ascii_case("KINESTHETIC") {
            xp = xp.saturating_add(XP_KINESTHETIC_BONUS);
        }
        xp
    }
}

/// Maps a stored emotion label onto the wheel.
///
/// Legacy labels are folded in: anything mentioning "happy" counts as Joy and
/// anything mentioning "anxious" counts as Fear. Unknown labels return `None`.
pub fn normalize_emotion(label: &str) -> Option<&'static str> {
    let trimmed = label.trim();
    if let Some(known) = EMOTIONS.iter().find(|e| e.eq_ignore_ascii_case(trimmed)) {
        return Some(known);
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.contains("happy") {
        Some("Joy")
    } else if lower.contains("anxious") {
        Some("Fear")
    } else {
        None
    }
}

// ============================================================================
// Report
// ============================================================================

/// Highest completed level of one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgress {
    /// Topic name.
    pub topic: String,
    /// Highest completed level, 0 if none.
    pub highest_level: u32,
    /// Completion percentage, capped at 100.
    pub percent: f64,
}

/// Occurrences of one emotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionCount {
    /// Emotion label.
    pub emotion: String,
    /// Sessions classified with it.
    pub count: u32,
}

/// One day of the trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    /// Calendar day (UTC).
    pub date: NaiveDate,
    /// Sessions finished that day.
    pub sessions: u32,
    /// Correct answers over questions asked, in percent.
    pub accuracy_percent: f64,
    /// Hours studied, one decimal.
    pub hours: f64,
}

/// A learner's progress report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// Learner the report covers.
    pub learner_id: String,
    /// When the report was computed.
    pub generated_at: DateTime<Utc>,
    /// Sessions analysed.
    pub session_count: u32,
    /// Experience points.
    pub xp: u32,
    /// Consecutive study days ending today or yesterday.
    pub streak_days: u32,
    /// Overall accuracy in percent.
    pub accuracy_percent: f64,
    /// Mean classifier confidence.
    pub average_confidence: f64,
    /// Total study time.
    pub study_seconds: u64,
    /// Per-topic mastery, sorted by topic.
    pub topics: Vec<TopicProgress>,
    /// Counts for all eight emotions in wheel order.
    pub emotions: Vec<EmotionCount>,
    /// Most frequent emotion, if any session was classified.
    pub dominant_emotion: Option<String>,
    /// The last seven days, oldest first.
    pub trend: Vec<TrendPoint>,
    /// Free-text summary for humans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
}

impl ProgressReport {
    /// Computes a report from finished sessions as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidData`] if a session scored more answers
    /// than it asked.
    pub fn from_sessions(
        learner_id: impl Into<String>,
        sessions: &[SessionSummary],
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if let Some(bad) = sessions.iter().find(|s| s.score > s.total_questions) {
            return Err(ReportError::InvalidData(format!(
                "session at {} scored {} of {} questions",
                bad.timestamp, bad.score, bad.total_questions
            )));
        }

        let today = now.date_naive();
        let emotions = emotion_distribution(sessions);
        Ok(Self {
            learner_id: learner_id.into(),
            generated_at: now,
            session_count: u32::try_from(sessions.len()).unwrap_or(u32::MAX),
            xp: total_xp(sessions),
            streak_days: streak(sessions, today),
            accuracy_percent: accuracy_percent(sessions.iter()),
            average_confidence: average_confidence(sessions),
            study_seconds: sessions.iter().map(|s| s.duration_seconds).sum(),
            topics: topic_progress(sessions),
            dominant_emotion: dominant_emotion(&emotions),
            emotions,
            trend: trend(sessions, today),
            narrative: None,
        })
    }

    /// Attaches a narrative.
    #[must_use]
    pub fn with_narrative(mut self, narrative: impl Into<String>) -> Self {
        self.narrative = Some(narrative.into());
        self
    }

    /// One-paragraph factual summary, used as input for a narrative.
    pub fn summary_text(&self) -> String {
        let mut text = format!(
            "Sessions: {}. Average accuracy: {:.0}%. Study streak: {} days. XP: {}.",
            self.session_count, self.accuracy_percent, self.streak_days, self.xp
        );
        if let Some(emotion) = &self.dominant_emotion {
            text.push_str(&format!(" Dominant emotion: {emotion}."));
        }
        let topics: Vec<String> = self
            .topics
            .iter()
            .map(|t| format!("{} level {}", t.topic, t.highest_level))
            .collect();
        if !topics.is_empty() {
            text.push_str(&format!(" Completed: {}.", topics.join(", ")));
        }
        text
    }
}

// ============================================================================
// Analytics
// ============================================================================

/// Sum of per-session XP.
pub fn total_xp(sessions: &[SessionSummary]) -> u32 {
    sessions
        .iter()
        .fold(0u32, |acc, s| acc.saturating_add(s.xp()))
}

/// Consecutive distinct study days ending today, or yesterday if the
/// learner has not studied yet today. Zero otherwise.
pub fn streak(sessions: &[SessionSummary], today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = sessions.iter().map(|s| s.timestamp.date_naive()).collect();

    let start = if days.contains(&today) {
        Some(today)
    } else {
        today.pred_opt().filter(|yesterday| days.contains(yesterday))
    };

    let mut count = 0;
    let mut cursor = start;
    while let Some(day) = cursor.filter(|d| days.contains(d)) {
        count += 1;
        cursor = day.pred_opt();
    }
    count
}

/// Correct answers over questions asked, in percent. Zero with no questions.
pub fn accuracy_percent<'a>(sessions: impl Iterator<Item = &'a SessionSummary>) -> f64 {
    let (score, total) = sessions.fold((0u32, 0u32), |(score, total), s| {
        (
            score.saturating_add(s.score),
            total.saturating_add(s.total_questions),
        )
    });
    if total == 0 {
        0.0
    } else {
        round1(f64::from(score) / f64::from(total) * 100.0)
    }
}

fn average_confidence(sessions: &[SessionSummary]) -> f64 {
    if sessions.is_empty() {
        return 0.0;
    }
    let sum: f64 = sessions.iter().map(|s| s.confidence_score).sum();
    let count = u32::try_from(sessions.len()).unwrap_or(u32::MAX);
    (sum / f64::from(count) * 100.0).round() / 100.0
}

/// Highest completed level per topic.
pub fn topic_progress(sessions: &[SessionSummary]) -> Vec<TopicProgress> {
    let mut highest: BTreeMap<&str, u32> = BTreeMap::new();
    for session in sessions {
        let entry = highest.entry(session.topic.as_str()).or_insert(0);
        if session.completed_level() {
            *entry = (*entry).max(session.level);
        }
    }
    highest
        .into_iter()
        .map(|(topic, level)| TopicProgress {
            topic: topic.to_string(),
            highest_level: level,
            percent: (f64::from(level) / f64::from(LEVELS_PER_TOPIC) * 100.0).min(100.0),
        })
        .collect()
}

/// Counts for every emotion on the wheel, in wheel order.
pub fn emotion_distribution(sessions: &[SessionSummary]) -> Vec<EmotionCount> {
    let mut counts = [0u32; EMOTIONS.len()];
    for label in sessions.iter().filter_map(|s| normalize_emotion(&s.emotion)) {
        if let Some(index) = EMOTIONS.iter().position(|e| *e == label) {
            counts[index] += 1;
        }
    }
    EMOTIONS
        .iter()
        .zip(counts)
        .map(|(emotion, count)| EmotionCount {
            emotion: (*emotion).to_string(),
            count,
        })
        .collect()
}

/// The most frequent emotion; ties go to the earlier one on the wheel.
pub fn dominant_emotion(distribution: &[EmotionCount]) -> Option<String> {
    let mut best: Option<&EmotionCount> = None;
    for entry in distribution.iter().filter(|e| e.count > 0) {
        if best.map_or(true, |b| entry.count > b.count) {
            best = Some(entry);
        }
    }
    best.map(|e| e.emotion.clone())
}

/// Per-day accuracy and hours for the [`TREND_DAYS`] ending `today`.
pub fn trend(sessions: &[SessionSummary], today: NaiveDate) -> Vec<TrendPoint> {
    let mut days = Vec::with_capacity(TREND_DAYS as usize);
    let mut cursor = Some(today);
    for _ in 0..TREND_DAYS {
        let Some(day) = cursor else { break };
        days.push(day);
        cursor = day.pred_opt();
    }
    days.reverse();

    days.into_iter()
        .map(|date| {
            let on_day: Vec<&SessionSummary> = sessions
                .iter()
                .filter(|s| s.timestamp.date_naive() == date)
                .collect();
            let seconds: u64 = on_day.iter().map(|s| s.duration_seconds).sum();
            TrendPoint {
                date,
                sessions: u32::try_from(on_day.len()).unwrap_or(u32::MAX),
                accuracy_percent: accuracy_percent(on_day.iter().copied()),
                hours: round1(seconds_to_hours(seconds)),
            }
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn seconds_to_hours(seconds: u64) -> f64 {
    seconds as f64 / 3600.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

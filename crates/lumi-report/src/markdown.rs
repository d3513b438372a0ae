//! Markdown rendering of progress reports.
//!
//! The document has a summary table, per-topic mastery, the emotion
//! distribution, the seven-day trend and, when present, the narrative.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use lumi_report::{MarkdownGenerator, ProgressReport};
//!
//! let report = ProgressReport::from_sessions("ana", &[], Utc::now()).unwrap();
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Lumi Progress Report: ana"));
//! ```

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::{ProgressReport, LEVELS_PER_TOPIC};

/// Width of the text bars in the emotion table.
const BAR_WIDTH: u32 = 20;

/// Generates Markdown reports.
pub struct MarkdownGenerator<'a> {
    report: &'a ProgressReport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a ProgressReport) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_topics(&mut output);
        self.write_emotions(&mut output);
        self.write_trend(&mut output);
        self.write_narrative(&mut output);
        Self::write_footer(&mut output, &self.report.generated_at);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Lumi Progress Report: {}\n",
            escape_markdown(&self.report.learner_id)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let r = self.report;
        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Sessions | {} |", r.session_count);
        let _ = writeln!(output, "| XP | {} |", r.xp);
        let _ = writeln!(output, "| Streak | {} |", pluralize(r.streak_days, "day"));
        let _ = writeln!(output, "| Accuracy | {:.1}% |", r.accuracy_percent);
        let _ = writeln!(output, "| Average confidence | {:.2} |", r.average_confidence);
        let _ = writeln!(
            output,
            "| Study time | {} |",
            format_duration(r.study_seconds)
        );
        let _ = writeln!(
            output,
            "| Dominant emotion | {} |",
            r.dominant_emotion.as_deref().unwrap_or("None yet")
        );
        let _ = writeln!(output);
    }

    fn write_topics(&self, output: &mut String) {
        let _ = writeln!(output, "## Topics\n");

        if self.report.topics.is_empty() {
            let _ = writeln!(output, "*No topics studied yet.*\n");
            return;
        }

        let _ = writeln!(output, "| Topic | Level | Progress |");
        let _ = writeln!(output, "|-------|-------|----------|");
        for topic in &self.report.topics {
            let _ = writeln!(
                output,
                "| {} | {}/{} | {:.0}% |",
                escape_markdown(&topic.topic),
                topic.highest_level,
                LEVELS_PER_TOPIC,
                topic.percent
            );
        }
        let _ = writeln!(output);
    }

    fn write_emotions(&self, output: &mut String) {
        let _ = writeln!(output, "## Emotions\n");

        let max = self
            .report
            .emotions
            .iter()
            .map(|e| e.count)
            .max()
            .unwrap_or(0);
        if max == 0 {
            let _ = writeln!(output, "*No sessions classified yet.*\n");
            return;
        }

        let _ = writeln!(output, "| Emotion | Sessions | |");
        let _ = writeln!(output, "|---------|----------|-|");
        for entry in &self.report.emotions {
            let _ = writeln!(
                output,
                "| {} | {} | {} |",
                entry.emotion,
                entry.count,
                bar(entry.count, max)
            );
        }
        let _ = writeln!(output);
    }

    fn write_trend(&self, output: &mut String) {
        let _ = writeln!(output, "## Last 7 Days\n");
        let _ = writeln!(output, "| Date | Sessions | Accuracy | Hours |");
        let _ = writeln!(output, "|------|----------|----------|-------|");
        for point in &self.report.trend {
            let accuracy = if point.sessions == 0 {
                "-".to_string()
            } else {
                format!("{:.0}%", point.accuracy_percent)
            };
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:.1} |",
                point.date.format("%a %Y-%m-%d"),
                point.sessions,
                accuracy,
                point.hours
            );
        }
        let _ = writeln!(output);
    }

    fn write_narrative(&self, output: &mut String) {
        if let Some(narrative) = &self.report.narrative {
            let _ = writeln!(output, "## Tutor's Note\n");
            let _ = writeln!(output, "{}\n", narrative.trim());
        }
    }

    fn write_footer(output: &mut String, generated_at: &DateTime<Utc>) {
        let _ = writeln!(output, "---\n");
        let _ = writeln!(
            output,
            "*Generated by Lumi on {}*",
            generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}

fn pluralize(count: u32, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

fn bar(count: u32, max: u32) -> String {
    let filled = if max == 0 { 0 } else { count * BAR_WIDTH / max };
    "█".repeat(filled as usize)
}

/// Formats a duration in seconds to a human-readable string.
///
/// Examples: "45s", "2m 30s", "1h 5m 30s"
fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();

    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }

    parts.join(" ")
}

/// Escapes characters with special meaning in Markdown tables.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

//! JSON rendering of progress reports.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use lumi_report::ProgressReport;
//! use lumi_report::json::JsonGenerator;
//!
//! let report = ProgressReport::from_sessions("ana", &[], Utc::now()).unwrap();
//! let generator = JsonGenerator::new(&report);
//!
//! let compact = generator.generate().unwrap();
//! assert!(!compact.contains('\n'));
//!
//! // generator.write_to_file(Path::new("lumi-report.json"), true).unwrap();
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{ProgressReport, ReportError, Result};

/// JSON report generator.
pub struct JsonGenerator<'a> {
    report: &'a ProgressReport,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given report.
    #[must_use]
    pub const fn new(report: &'a ProgressReport) -> Self {
        Self { report }
    }

    /// Generates compact JSON output (single line).
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.report).map_err(ReportError::from)
    }

    /// Generates pretty-printed JSON output with indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.report).map_err(ReportError::from)
    }

    /// Writes the report to `path`, creating or overwriting the file.
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    /// Returns [`ReportError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::SessionSummary;

    fn sample_report() -> ProgressReport {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let sessions = vec![SessionSummary {
            timestamp: now,
            topic: "algebra".to_string(),
            level: 2,
            score: 3,
            total_questions: 4,
            decision: "NEXT_LEVEL".to_string(),
            emotion: "Trust".to_string(),
            confidence_score: 0.7,
            learning_style: "AUDITORY".to_string(),
            duration_seconds: 900,
        }];
        ProgressReport::from_sessions("ana", &sessions, now)
            .unwrap()
            .with_narrative("Steady progress.")
    }

    #[test]
    fn test_generate_compact_json() {
        let json = JsonGenerator::new(&sample_report()).generate().unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains(r#""learnerId":"ana""#));
        assert!(json.contains(r#""dominantEmotion":"Trust""#));
    }

    #[test]
    fn test_generate_pretty_json() {
        let json = JsonGenerator::new(&sample_report())
            .generate_pretty()
            .unwrap();
        assert!(json.contains('\n'));
        assert!(json.contains("  \"xp\": 80"));
    }

    #[test]
    fn test_round_trip_preserves_report() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate().unwrap();
        let parsed: ProgressReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_narrative_omitted_when_absent() {
        let mut report = sample_report();
        report.narrative = None;
        let json = JsonGenerator::new(&report).generate().unwrap();
        assert!(!json.contains("narrative"));
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lumi-report.json");
        JsonGenerator::new(&sample_report())
            .write_to_file(&path, true)
            .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"topics\""));
    }

    #[test]
    fn test_write_to_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.json");
        let err = JsonGenerator::new(&sample_report())
            .write_to_file(&path, false)
            .unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
    }
}

//! Authored curriculum: per-topic levels with fragments, quizzes and,
//! for some topics, pre-written explanations.
//!
//! A topic whose level carries `content` or style `variants` has a static
//! bundle and is answered without calling the generative service.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ContentError, LearningStyle, Result};

/// Maximum allowed curriculum file size in bytes (1MB).
pub const MAX_CURRICULUM_SIZE: u64 = 1024 * 1024;

const BUILTIN_CURRICULUM: &str = include_str!("../data/curriculum.json");

/// A multiple-choice question.
///
/// Invariant: `correct_option_index` indexes `options`, and there are at
/// least two options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizItem {
    /// Question text.
    pub question: String,
    /// Answer options, in display order.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_option_index: usize,
    /// Explanation revealed after answering.
    pub explanation: String,
}

impl QuizItem {
    /// Creates a validated quiz item.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::InvalidCurriculum` if the invariant does not hold.
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        correct_option_index: usize,
        explanation: impl Into<String>,
    ) -> Result<Self> {
        let item = Self {
            question: question.into(),
            options,
            correct_option_index,
            explanation: explanation.into(),
        };
        item.validate()?;
        Ok(item)
    }

    /// Checks the option invariants.
    pub fn validate(&self) -> Result<()> {
        if self.options.len() < 2 {
            return Err(ContentError::InvalidCurriculum(format!(
                "quiz item '{}' needs at least two options",
                self.question
            )));
        }
        if self.correct_option_index >= self.options.len() {
            return Err(ContentError::InvalidCurriculum(format!(
                "quiz item '{}' has correct option {} but only {} options",
                self.question,
                self.correct_option_index,
                self.options.len()
            )));
        }
        Ok(())
    }

    /// Returns `true` if `option` is the correct answer.
    pub const fn is_correct(&self, option: usize) -> bool {
        option == self.correct_option_index
    }
}

/// One unit of learning content shown before the quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Stable identifier, used in cache keys.
    pub id: String,
    /// Fragment body.
    pub text: String,
}

/// Everything authored for one level of a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumLevel {
    /// Level title.
    pub title: String,
    /// Generic pre-written explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Pre-written explanations per learning style.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variants: HashMap<LearningStyle, String>,
    /// Ordered learning fragments.
    #[serde(default)]
    pub fragments: Vec<Fragment>,
    /// Quiz shown after the fragments.
    #[serde(default)]
    pub quiz: Vec<QuizItem>,
}

impl CurriculumLevel {
    /// Returns the authored explanation for `style`, falling back to the
    /// generic variant.
    pub fn explanation_for(&self, style: LearningStyle) -> Option<&str> {
        self.variants
            .get(&style)
            .or(self.content.as_ref())
            .map(String::as_str)
            .filter(|text| !text.trim().is_empty())
    }

    /// Returns `true` if the level carries a static bundle.
    pub fn has_authored_explanation(&self) -> bool {
        self.explanation_for(LearningStyle::Default).is_some()
            || self.variants.values().any(|v| !v.trim().is_empty())
    }
}

/// All levels of one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCurriculum {
    /// Canonical topic name.
    pub name: String,
    /// Other names the topic is requested under.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Levels keyed by number, starting at 1.
    pub levels: BTreeMap<u32, CurriculumLevel>,
}

impl TopicCurriculum {
    fn matches(&self, normalized: &str) -> bool {
        normalize_topic(&self.name) == normalized
            || self.aliases.iter().any(|a| normalize_topic(a) == normalized)
    }
}

#[derive(Debug, Deserialize)]
struct CurriculumFile {
    topics: Vec<TopicCurriculum>,
}

/// Lower-cases and collapses whitespace so lookups ignore cosmetic differences.
pub fn normalize_topic(topic: &str) -> String {
    topic
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The set of authored topics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Curriculum {
    topics: Vec<TopicCurriculum>,
}

impl Curriculum {
    /// Parses the curriculum shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CURRICULUM)
    }

    /// Parses and validates a curriculum document.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CurriculumFile = serde_json::from_str(json)?;
        let curriculum = Self { topics: file.topics };
        curriculum.validate()?;
        Ok(curriculum)
    }

    /// Loads a curriculum file, enforcing the size limit and UTF-8.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::CurriculumNotFound`, `CurriculumTooLarge`,
    /// `CurriculumEncoding`, `Json` or `InvalidCurriculum`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ContentError::CurriculumNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ContentError::Io(e)
            }
        })?;

        if metadata.len() > MAX_CURRICULUM_SIZE {
            return Err(ContentError::CurriculumTooLarge {
                path: path.to_path_buf(),
                size_kb: metadata.len() / 1024,
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                ContentError::CurriculumEncoding {
                    path: path.to_path_buf(),
                }
            } else {
                ContentError::Io(e)
            }
        })?;

        Self::from_json(&contents)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for topic in &self.topics {
            let name = normalize_topic(&topic.name);
            if name.is_empty() {
                return Err(ContentError::InvalidCurriculum(
                    "topic name must not be empty".to_string(),
                ));
            }
            if !seen.insert(name) {
                return Err(ContentError::InvalidCurriculum(format!(
                    "topic '{}' is defined twice",
                    topic.name
                )));
            }
            if topic.levels.contains_key(&0) {
                return Err(ContentError::InvalidCurriculum(format!(
                    "topic '{}' has a level 0; levels start at 1",
                    topic.name
                )));
            }
            for (number, level) in &topic.levels {
                let mut ids = HashSet::new();
                for fragment in &level.fragments {
                    if fragment.id.trim().is_empty() || !ids.insert(fragment.id.as_str()) {
                        return Err(ContentError::InvalidCurriculum(format!(
                            "topic '{}' level {number} has a missing or duplicate fragment id",
                            topic.name
                        )));
                    }
                }
                for item in &level.quiz {
                    item.validate()?;
                }
            }
        }
        Ok(())
    }

    /// Finds a topic by name or alias.
    pub fn topic(&self, topic: &str) -> Option<&TopicCurriculum> {
        let normalized = normalize_topic(topic);
        self.topics.iter().find(|t| t.matches(&normalized))
    }

    /// Returns the authored level, if any.
    pub fn level(&self, topic: &str, level: u32) -> Option<&CurriculumLevel> {
        self.topic(topic).and_then(|t| t.levels.get(&level))
    }

    /// Returns the static explanation for (topic, level, style), if authored.
    pub fn authored_explanation(
        &self,
        topic: &str,
        level: u32,
        style: LearningStyle,
    ) -> Option<&str> {
        self.level(topic, level)
            .and_then(|l| l.explanation_for(style))
    }

    /// Highest level defined for the topic.
    pub fn final_level(&self, topic: &str) -> Option<u32> {
        self.topic(topic)
            .and_then(|t| t.levels.keys().next_back().copied())
    }

    /// Canonical names of every topic.
    pub fn topic_names(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|t| t.name.as_str())
    }
}

//! Cache keys, cache entries and validity rules for resolved content.
//!
//! Keys keep the `{topic}_{level}_{style}_{mode}` shape already used by
//! stored entries. Free text is escaped so that semantically distinct
//! requests never share a key, a fragment id is appended after `#` and a
//! digest of the source text after `#~`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{ContentMode, ContentRequest, LearningStyle};

/// Collection holding cached explanations.
pub const CACHE_COLLECTION: &str = "content_cache";

/// Markers of content formats that are no longer served.
pub const DEFAULT_STALE_MARKERS: &[&str] = &["[object Object]", "```json"];

/// Identity of a cacheable explanation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    topic: String,
    level: u32,
    style: LearningStyle,
    mode: ContentMode,
    fragment_id: Option<String>,
    source_digest: Option<String>,
}

impl CacheKey {
    /// Derives the key for a request.
    pub fn for_request(request: &ContentRequest) -> Self {
        Self {
            topic: request.topic().to_string(),
            level: request.level(),
            style: request.style(),
            mode: request.mode(),
            fragment_id: request.source_fragment_id().map(str::to_string),
            source_digest: source_digest(request.source_text()),
        }
    }

    /// Renders the key used in the document store.
    ///
    /// # Example
    ///
    /// ```
    /// use lumi_content::{CacheKey, ContentMode, ContentRequest, LearningStyle};
    ///
    /// let request = ContentRequest::new("linear  equations", 1, LearningStyle::Visual, ContentMode::Explain).unwrap();
    /// assert_eq!(CacheKey::for_request(&request).to_storage_key(), "linear_equations_1_VISUAL_EXPLAIN");
    /// ```
    pub fn to_storage_key(&self) -> String {
        let mut key = format!(
            "{}_{}_{}_{}",
            encode_component(&self.topic),
            self.level,
            self.style,
            self.mode
        );
        if let Some(fragment) = &self.fragment_id {
            key.push('#');
            key.push_str(&encode_component(fragment));
        }
        if let Some(digest) = &self.source_digest {
            key.push_str("#~");
            key.push_str(digest);
        }
        key
    }
}

/// First 8 bytes of the SHA-256 of the trimmed text, hex encoded. Blank text
/// has no digest.
fn source_digest(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let hash = Sha256::digest(text.as_bytes());
    Some(hex::encode(&hash[..8]))
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_storage_key())
    }
}

/// Trims, collapses whitespace runs to `_` and escapes the characters that
/// carry structure in a key.
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, word) in raw.split_whitespace().enumerate() {
        if i > 0 {
            out.push('_');
        }
        for ch in word.chars() {
            match ch {
                '%' => out.push_str("%25"),
                '_' => out.push_str("%5F"),
                '#' => out.push_str("%23"),
                c => out.push(c),
            }
        }
    }
    out
}

/// A persisted explanation. Entries are written once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Storage key of the entry.
    pub key: String,
    /// Cached explanation text.
    pub explanation: String,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(key: &CacheKey, explanation: impl Into<String>) -> Self {
        Self {
            key: key.to_storage_key(),
            explanation: explanation.into(),
            created_at: Utc::now(),
        }
    }
}

/// Decides whether a cached explanation may still be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheValidity {
    stale_markers: Vec<String>,
}

impl Default for CacheValidity {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_MARKERS.iter().map(ToString::to_string))
    }
}

impl CacheValidity {
    /// Creates a validity rule from a denylist of stale-format markers.
    pub fn new(markers: impl IntoIterator<Item = String>) -> Self {
        Self {
            stale_markers: markers.into_iter().filter(|m| !m.is_empty()).collect(),
        }
    }

    /// Returns `true` if the explanation is non-blank and free of stale markers.
    pub fn is_valid(&self, explanation: &str) -> bool {
        !explanation.trim().is_empty()
            && !self
                .stale_markers
                .iter()
                .any(|marker| explanation.contains(marker.as_str()))
    }
}

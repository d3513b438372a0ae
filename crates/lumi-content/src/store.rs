//! Document store collaborator.
//!
//! The content core needs three primitives from its store: get-by-key,
//! set-by-key (upsert) and append-to-collection. [`MemoryStore`] backs tests
//! and ephemeral servers; [`JsonFileStore`] persists to a directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{ContentError, Result};

/// Storage backend shared by the cache, session history and progress data.
///
/// Writes only need to become visible to later reads eventually; no
/// transactions are required.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a keyed document.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>>;

    /// Inserts or replaces a keyed document.
    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<()>;

    /// Appends a document to an ordered collection.
    async fn append(&self, collection: &str, value: Value) -> Result<()>;

    /// Returns every appended document in insertion order.
    async fn list(&self, collection: &str) -> Result<Vec<Value>>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, HashMap<String, Value>>>,
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<()> {
        self.documents
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn append(&self, collection: &str, value: Value) -> Result<()> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(value);
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }
}

/// Directory-backed store.
///
/// Keyed documents live at `{root}/{collection}/{key}.json`; appended
/// collections live in `{root}/{collection}.jsonl`, one document per line.
/// Path segments are percent-encoded so keys cannot escape the root.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    append_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            append_lock: Mutex::new(()),
        }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        collection
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(encode_segment(segment)))
    }

    fn document_path(&self, collection: &str, key: &str) -> PathBuf {
        self.collection_dir(collection)
            .join(format!("{}.json", encode_segment(key)))
    }

    fn collection_file(&self, collection: &str) -> PathBuf {
        self.collection_dir(collection).with_extension("jsonl")
    }
}

/// Percent-encodes everything except ASCII alphanumerics, `-` and `_`.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn store_err(collection: &str, e: impl std::fmt::Display) -> ContentError {
    ContentError::store(collection, e.to_string())
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let path = self.document_path(collection, key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| store_err(collection, format!("corrupt document {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_err(collection, e)),
        }
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<()> {
        let path = self.document_path(collection, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store_err(collection, e))?;
        }
        let body = serde_json::to_vec_pretty(&value)?;
        // One temp file per write, so concurrent writers to a key never rename
        // each other's file away
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| store_err(collection, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| store_err(collection, e))?;
        debug!(path = %path.display(), "Document written");
        Ok(())
    }

    async fn append(&self, collection: &str, value: Value) -> Result<()> {
        let path = self.collection_file(collection);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store_err(collection, e))?;
        }
        let mut line = serde_json::to_string(&value)?;
        line.push('\n');

        let _guard = self.append_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| store_err(collection, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| store_err(collection, e))?;
        file.flush().await.map_err(|e| store_err(collection, e))?;
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>> {
        let path = self.collection_file(collection);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(store_err(collection, e)),
        };
        let mut documents = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(value) => documents.push(value),
                Err(e) => warn!(
                    collection,
                    line = index + 1,
                    error = %e,
                    "Skipping unreadable document"
                ),
            }
        }
        Ok(documents)
    }
}

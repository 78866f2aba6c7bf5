//! Dead Letter Sink
//!
//! Durable, append-only storage for permanently failed batches. Each entry
//! carries the full batch payload plus diagnostic context and is written
//! exactly once under a collision-resistant identifier. Entries are the last
//! line of defense against data loss, so a failed write is escalated to the
//! caller rather than swallowed.

use crate::consumer::checkpoint::sanitize_identity;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Errors from dead-letter persistence
#[derive(Debug, thiserror::Error)]
pub enum DeadLetterError {
    #[error("dead letter I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dead letter serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One permanently failed batch, with diagnostic context
///
/// Immutable after creation. `data` round-trips every element of the failed
/// batch so an operator can re-inject it into the normal ingestion path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry<T> {
    /// Collision-resistant entry identifier
    pub id: Uuid,
    /// When the batch was dead-lettered
    pub timestamp: DateTime<Utc>,
    /// The terminal error that exhausted or bypassed the retry budget
    pub error: String,
    /// Element count, kept redundantly for quick inspection
    pub batch_size: usize,
    /// The full batch payload
    pub data: Vec<T>,
}

/// Storage backend for dead-lettered batches
///
/// Namespaced per consumer identity; safe for concurrent use by different
/// identities.
pub trait DeadLetterSink<T>: Send + Sync {
    /// Persist a failed batch as a new immutable entry
    ///
    /// # Errors
    /// A write failure here threatens the no-data-loss guarantee and must be
    /// treated as fatal for the consumer identity.
    fn record(
        &self,
        consumer_id: &str,
        batch: Vec<T>,
        error: &str,
    ) -> Result<DeadLetterEntry<T>, DeadLetterError>;

    /// List all entries recorded for an identity, oldest first
    ///
    /// Supports operator-driven reprocessing; this crate never deletes
    /// entries itself.
    fn list(&self, consumer_id: &str) -> Result<Vec<DeadLetterEntry<T>>, DeadLetterError>;
}

impl<T, S> DeadLetterSink<T> for std::sync::Arc<S>
where
    S: DeadLetterSink<T> + ?Sized,
{
    fn record(
        &self,
        consumer_id: &str,
        batch: Vec<T>,
        error: &str,
    ) -> Result<DeadLetterEntry<T>, DeadLetterError> {
        (**self).record(consumer_id, batch, error)
    }

    fn list(&self, consumer_id: &str) -> Result<Vec<DeadLetterEntry<T>>, DeadLetterError> {
        (**self).list(consumer_id)
    }
}

/// File-backed dead letter sink
///
/// Entries live under `<root>/<consumer_id>/dlq/dlq-<uuid>.json`, one file
/// per entry.
#[derive(Debug, Clone)]
pub struct FileDeadLetterSink {
    root: PathBuf,
}

impl FileDeadLetterSink {
    /// Create a sink rooted at the given directory
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn dlq_dir(&self, consumer_id: &str) -> PathBuf {
        self.root.join(sanitize_identity(consumer_id)).join("dlq")
    }
}

impl<T> DeadLetterSink<T> for FileDeadLetterSink
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn record(
        &self,
        consumer_id: &str,
        batch: Vec<T>,
        error: &str,
    ) -> Result<DeadLetterEntry<T>, DeadLetterError> {
        let dir = self.dlq_dir(consumer_id);
        fs::create_dir_all(&dir)?;

        let entry = DeadLetterEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            error: error.to_string(),
            batch_size: batch.len(),
            data: batch,
        };

        let path = dir.join(format!("dlq-{}.json", entry.id));
        fs::write(&path, serde_json::to_string_pretty(&entry)?)?;
        Ok(entry)
    }

    fn list(&self, consumer_id: &str) -> Result<Vec<DeadLetterEntry<T>>, DeadLetterError> {
        let dir = self.dlq_dir(consumer_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for dirent in fs::read_dir(&dir)? {
            let path = dirent?.path();
            let is_entry = path.extension().is_some_and(|e| e == "json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("dlq-"));
            if !is_entry {
                continue;
            }
            let json = fs::read_to_string(&path)?;
            entries.push(serde_json::from_str(&json)?);
        }

        entries.sort_by_key(|e: &DeadLetterEntry<T>| e.timestamp);
        Ok(entries)
    }
}

/// In-memory dead letter sink for tests and embedded use
#[derive(Debug, Default)]
pub struct InMemoryDeadLetterSink<T> {
    entries: Mutex<HashMap<String, Vec<DeadLetterEntry<T>>>>,
}

impl<T> InMemoryDeadLetterSink<T> {
    /// Create an empty in-memory sink
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> DeadLetterSink<T> for InMemoryDeadLetterSink<T>
where
    T: Clone + Send + Sync,
{
    fn record(
        &self,
        consumer_id: &str,
        batch: Vec<T>,
        error: &str,
    ) -> Result<DeadLetterEntry<T>, DeadLetterError> {
        let entry = DeadLetterEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            error: error.to_string(),
            batch_size: batch.len(),
            data: batch,
        };
        self.entries
            .lock()
            .entry(consumer_id.to_string())
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    fn list(&self, consumer_id: &str) -> Result<Vec<DeadLetterEntry<T>>, DeadLetterError> {
        Ok(self
            .entries
            .lock()
            .get(consumer_id)
            .cloned()
            .unwrap_or_default())
    }
}

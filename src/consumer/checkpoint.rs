//! Checkpoint Store
//!
//! Durable progress records for crash recovery. One checkpoint per consumer
//! identity, overwritten wholesale after successful batches and read once at
//! startup. The file-backed store writes through a temporary file and renames
//! it into place, so a crash mid-save can never surface a half-written
//! checkpoint on the next load.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Errors from checkpoint persistence
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable record of a consumer's progress
///
/// `processed_count` is monotonically non-decreasing over the lifetime of a
/// consumer identity; `last_batch_number` always names the last batch that
/// was processed *successfully*.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Number of the last successfully processed batch (1-based, 0 = none)
    pub last_batch_number: u64,
    /// Total elements successfully processed so far
    pub processed_count: u64,
    /// When this checkpoint was taken
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// A fresh-start checkpoint (no batches processed)
    pub fn fresh() -> Self {
        Self {
            last_batch_number: 0,
            processed_count: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Storage backend for consumer checkpoints
///
/// Implementations must be safe under concurrent use by *different* consumer
/// identities; a single identity is only ever written from one consumer.
pub trait CheckpointStore: Send + Sync {
    /// Load the last persisted checkpoint for an identity
    ///
    /// # Returns
    /// `None` when no checkpoint exists (fresh start).
    ///
    /// # Errors
    /// Returns an error when a checkpoint exists but cannot be read or parsed.
    fn load(&self, consumer_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Durably persist a checkpoint, replacing any prior value
    ///
    /// Must be atomic with respect to crashes.
    fn save(&self, consumer_id: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
}

impl<S> CheckpointStore for std::sync::Arc<S>
where
    S: CheckpointStore + ?Sized,
{
    fn load(&self, consumer_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        (**self).load(consumer_id)
    }

    fn save(&self, consumer_id: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        (**self).save(consumer_id, checkpoint)
    }
}

/// Map a consumer id to a single directory component.
///
/// Path separators and other hostile characters are replaced and letters are
/// case-folded for case-insensitive filesystems. The folding is lossy
/// ("Worker A" and "worker_a" would land in the same directory and break the
/// one-writer-per-identity rule), so any id the folding altered carries an
/// FNV-1a fingerprint of the original spelling.
pub(crate) fn sanitize_identity(consumer_id: &str) -> String {
    let folded: String = consumer_id
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if folded == consumer_id {
        return folded;
    }

    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in consumer_id.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("{folded}-{:08x}", hash as u32)
}

/// File-backed checkpoint store
///
/// Each identity gets `<root>/<consumer_id>/checkpoint.json`. Saves write to
/// `checkpoint.json.tmp` in the same directory and atomically rename over the
/// live file.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at the given directory
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn checkpoint_path(&self, consumer_id: &str) -> PathBuf {
        self.root
            .join(sanitize_identity(consumer_id))
            .join("checkpoint.json")
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, consumer_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.checkpoint_path(consumer_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        let checkpoint = serde_json::from_str(&json)?;
        Ok(Some(checkpoint))
    }

    fn save(&self, consumer_id: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.checkpoint_path(consumer_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        // Write-then-rename keeps the live file whole at every instant.
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(serde_json::to_string_pretty(checkpoint)?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

/// In-memory checkpoint store for tests and embedded use
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self, consumer_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.checkpoints.lock().get(consumer_id).cloned())
    }

    fn save(&self, consumer_id: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.checkpoints
            .lock()
            .insert(consumer_id.to_string(), checkpoint.clone());
        Ok(())
    }
}

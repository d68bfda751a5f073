//! File-based listing checkpoint for resume capability.
//!
//! The checkpoint is the raw listing marker and nothing else: the whole file
//! content is the cursor to resume from. It records enumeration progress only,
//! so objects that failed their transfer are not rediscovered through it.

use crate::error::{ReplicateError, Result};
use crate::store::START_CURSOR;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reads, writes and clears the persisted listing cursor.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Create a store for the checkpoint file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cursor to resume from, or the start cursor when there is none.
    ///
    /// Never fails: an unreadable checkpoint means starting over.
    pub fn read(&self) -> String {
        match std::fs::read_to_string(&self.path) {
            Ok(cursor) => cursor,
            Err(e) if e.kind() == ErrorKind::NotFound => START_CURSOR.to_string(),
            Err(e) => {
                warn!(
                    "Ignoring unreadable checkpoint {:?}, starting from the beginning: {}",
                    self.path, e
                );
                START_CURSOR.to_string()
            }
        }
    }

    /// Persist `cursor`, replacing any previous checkpoint.
    ///
    /// The start cursor is never written.
    pub fn write(&self, cursor: &str) -> Result<()> {
        if cursor == START_CURSOR {
            return Ok(());
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, cursor).map_err(|e| {
            ReplicateError::State(format!("failed to write {:?}: {}", temp_path, e))
        })?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            ReplicateError::State(format!("failed to replace {:?}: {}", self.path, e))
        })?;

        debug!("Checkpoint {:?} set to marker '{}'", self.path, cursor);
        Ok(())
    }

    /// Remove the checkpoint; a missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Checkpoint {:?} removed", self.path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ReplicateError::State(format!(
                "failed to remove {:?}: {}",
                self.path, e
            ))),
        }
    }

    /// Whether a checkpoint file currently exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

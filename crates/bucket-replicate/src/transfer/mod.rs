//! Single-object transfer: fetch from source, optionally mirror to disk, put to destination.
//!
//! Each step can fail independently. A failure aborts only the object being
//! transferred and nothing is rolled back, so a mirrored file may exist for an
//! object whose upload failed. A later attempt overwrites it.

use crate::store::{ObjectRecord, SharedStore, StoreError};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Step of a transfer that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStage {
    /// Reading the object from the source bucket.
    Fetch,
    /// Writing the local mirror copy.
    Mirror,
    /// Writing the object to the destination bucket.
    Put,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStage::Fetch => write!(f, "fetch"),
            TransferStage::Mirror => write!(f, "mirror"),
            TransferStage::Put => write!(f, "put"),
        }
    }
}

/// A transfer that did not complete, with the record needed to try again.
#[derive(Debug, Clone)]
pub struct TransferFailure {
    /// The object that failed.
    pub record: ObjectRecord,
    /// Where it failed.
    pub stage: TransferStage,
    /// Human-readable cause.
    pub cause: String,
}

impl TransferFailure {
    fn new(record: &ObjectRecord, stage: TransferStage, cause: impl fmt::Display) -> Self {
        Self {
            record: record.clone(),
            stage,
            cause: cause.to_string(),
        }
    }

    /// Key of the failed object.
    pub fn key(&self) -> &str {
        &self.record.key
    }
}

impl fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed during {}: {}", self.record.key, self.stage, self.cause)
    }
}

/// Copies objects from the source store to the destination store.
pub struct TransferWorker {
    source: SharedStore,
    dest: SharedStore,
    mirror_root: Option<PathBuf>,
}

impl TransferWorker {
    /// Create a worker without local mirroring.
    pub fn new(source: SharedStore, dest: SharedStore) -> Self {
        Self {
            source,
            dest,
            mirror_root: None,
        }
    }

    /// Also write every object below `root`.
    pub fn with_mirror(mut self, root: Option<PathBuf>) -> Self {
        self.mirror_root = root;
        self
    }

    /// Transfer one object, returning the number of bytes copied.
    pub async fn transfer(&self, record: &ObjectRecord) -> Result<u64, TransferFailure> {
        let data = self
            .source
            .get(&record.key)
            .await
            .map_err(|e| TransferFailure::new(record, TransferStage::Fetch, e))?;

        if let Some(ref root) = self.mirror_root {
            write_mirror(root, &record.key, &data)
                .await
                .map_err(|e| TransferFailure::new(record, TransferStage::Mirror, e))?;
        }

        let len = data.len() as u64;
        self.dest
            .put(&record.key, data)
            .await
            .map_err(|e| TransferFailure::new(record, TransferStage::Put, e))?;

        Ok(len)
    }
}

/// Local path for `key` below `root`, keeping the key's '/' separators as directories.
///
/// Keys with a `..` segment are rejected because they would land outside `root`.
pub fn mirror_path(root: &Path, key: &str) -> Result<PathBuf, StoreError> {
    let mut path = root.to_path_buf();
    for segment in key.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(StoreError::InvalidConfig {
                    message: format!("key '{}' escapes the mirror directory", key),
                })
            }
            segment => path.push(segment),
        }
    }
    Ok(path)
}

async fn write_mirror(root: &Path, key: &str, data: &Bytes) -> Result<(), StoreError> {
    let path = mirror_path(root, key)?;

    // Directory placeholder objects ("photos/") become plain directories
    if key.ends_with('/') {
        return tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| StoreError::from_io(path.display().to_string(), e));
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::from_io(parent.display().to_string(), e))?;
    }

    tokio::fs::write(&path, data)
        .await
        .map_err(|e| StoreError::from_io(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn stores() -> (Arc<MemoryStore>, Arc<MemoryStore>) {
        let source = MemoryStore::new("origin");
        source.insert("docs/2024/report.pdf", "%PDF-1.7 quarterly");
        source.insert("readme.txt", "hello");
        (Arc::new(source), Arc::new(MemoryStore::new("replica")))
    }

    fn record(store: &MemoryStore, key: &str) -> ObjectRecord {
        let size = store.object(key).map(|d| d.len() as u64).unwrap_or(0);
        ObjectRecord::new(key, size)
    }

    #[tokio::test]
    async fn test_transfer_copies_bytes() {
        let (source, dest) = stores();
        let worker = TransferWorker::new(source.clone(), dest.clone());

        let bytes = worker.transfer(&record(&source, "readme.txt")).await.unwrap();

        assert_eq!(bytes, 5);
        assert_eq!(dest.object("readme.txt").unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_transfer_mirrors_nested_key() {
        let (source, dest) = stores();
        let dir = TempDir::new().unwrap();
        let worker = TransferWorker::new(source.clone(), dest.clone())
            .with_mirror(Some(dir.path().to_path_buf()));

        worker
            .transfer(&record(&source, "docs/2024/report.pdf"))
            .await
            .unwrap();

        let mirrored = std::fs::read(dir.path().join("docs/2024/report.pdf")).unwrap();
        assert_eq!(mirrored, b"%PDF-1.7 quarterly");
        assert!(dest.object("docs/2024/report.pdf").is_some());
    }

    #[tokio::test]
    async fn test_mirror_overwrites_existing_file() {
        let (source, dest) = stores();
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "stale content that is longer").unwrap();
        let worker =
            TransferWorker::new(source.clone(), dest).with_mirror(Some(dir.path().to_path_buf()));

        worker.transfer(&record(&source, "readme.txt")).await.unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("readme.txt")).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_fetch_failure_reports_stage() {
        let (source, dest) = stores();
        source.fail_get("readme.txt", 1);
        let worker = TransferWorker::new(source.clone(), dest.clone());

        let failure = worker
            .transfer(&record(&source, "readme.txt"))
            .await
            .unwrap_err();

        assert_eq!(failure.stage, TransferStage::Fetch);
        assert_eq!(failure.key(), "readme.txt");
        assert!(dest.is_empty());
    }

    #[tokio::test]
    async fn test_put_failure_keeps_mirror_copy() {
        let (source, dest) = stores();
        dest.fail_put("readme.txt", 1);
        let dir = TempDir::new().unwrap();
        let worker = TransferWorker::new(source.clone(), dest.clone())
            .with_mirror(Some(dir.path().to_path_buf()));

        let failure = worker
            .transfer(&record(&source, "readme.txt"))
            .await
            .unwrap_err();

        assert_eq!(failure.stage, TransferStage::Put);
        assert!(dir.path().join("readme.txt").exists());
        assert!(dest.object("readme.txt").is_none());
    }

    #[tokio::test]
    async fn test_directory_marker_creates_directory() {
        let source = Arc::new(MemoryStore::new("origin"));
        source.insert("photos/", "");
        let dest = Arc::new(MemoryStore::new("replica"));
        let dir = TempDir::new().unwrap();
        let worker = TransferWorker::new(source.clone(), dest.clone())
            .with_mirror(Some(dir.path().to_path_buf()));

        worker.transfer(&ObjectRecord::new("photos/", 0)).await.unwrap();

        assert!(dir.path().join("photos").is_dir());
        assert!(dest.object("photos/").is_some());
    }

    #[test]
    fn test_mirror_path_preserves_separators() {
        let root = Path::new("/srv/mirror");
        assert_eq!(
            mirror_path(root, "a/b/c.txt").unwrap(),
            PathBuf::from("/srv/mirror/a/b/c.txt")
        );
        assert_eq!(
            mirror_path(root, "/leading//double.txt").unwrap(),
            PathBuf::from("/srv/mirror/leading/double.txt")
        );
        assert!(mirror_path(root, "../etc/passwd").is_err());
        assert!(mirror_path(root, "a/../../b").is_err());
    }
}

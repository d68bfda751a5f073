//! Object store abstraction used by the replication engine.
//!
//! The engine only needs three operations from a bucket: a marker-based
//! paginated listing, a whole-object read and a whole-object write. Two
//! backends implement them:
//!
//! - [`S3Store`]: any S3-compatible endpoint through the AWS SDK
//! - [`MemoryStore`]: an in-process bucket with fault injection

mod memory;
mod s3;

pub use memory::MemoryStore;
pub use s3::S3Store;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Listing cursor that starts an enumeration and, when returned, ends it.
pub const START_CURSOR: &str = "";

/// Shared handle to a store, cloned into every page task.
pub type SharedStore = Arc<dyn ObjectStore>;

/// One object as reported by a listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Object key, unique within the bucket.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds).
    pub last_modified: Option<i64>,
}

impl ObjectRecord {
    /// Create a record with only a key and size.
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Records in backend order.
    pub records: Vec<ObjectRecord>,
    /// Opaque cursor for the next call; empty when the listing is exhausted.
    pub next_cursor: String,
}

impl ListPage {
    /// Whether this is the final page of the enumeration.
    pub fn is_last(&self) -> bool {
        self.next_cursor == START_CURSOR
    }
}

/// Errors reported by an object store backend.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Object not found.
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Network or service error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    Io { path: String, message: String },

    /// Invalid client configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StoreError {
    /// Create an Io error from std::io::Error.
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Minimal bucket operations - implemented by each backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket name this store is bound to.
    fn bucket(&self) -> &str;

    /// List up to `page_size` objects under `prefix` strictly after `cursor`.
    async fn list(&self, prefix: &str, cursor: &str, page_size: usize)
        -> Result<ListPage, StoreError>;

    /// Download an object.
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Upload an object, replacing any existing one.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError>;
}

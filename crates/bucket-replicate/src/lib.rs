//! # bucket-replicate
//!
//! One-way replication of objects between two S3-compatible buckets.
//!
//! This library provides the core functionality for copying every object of a
//! source bucket into a destination bucket with support for:
//!
//! - **Paginated listing** with marker-based cursors and an optional key prefix
//! - **Parallel transfers** with a bounded pool of page tasks
//! - **Failure isolation** where a failed object never stops the run
//! - **Single retry pass** for every object that failed the first time
//! - **Resume capability** via a listing checkpoint file
//! - **Local mirroring** of each object below a download directory
//!
//! ## Example
//!
//! ```rust,no_run
//! use bucket_replicate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.ini")?;
//!     let orchestrator = Orchestrator::connect(config).await?;
//!     let report = orchestrator.run().await?;
//!     println!("Replicated {} objects", report.objects_synced);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod source;
pub mod state;
pub mod store;
pub mod transfer;

// Re-exports for convenient access
pub use config::{Config, StoreSettings, SyncConfig};
pub use error::{ReplicateError, Result, EXIT_UNRECOVERED_OBJECTS};
pub use orchestrator::{Orchestrator, RetryOutcome, SessionOutcome, SyncReport};
pub use source::Paginator;
pub use state::CheckpointStore;
pub use store::{ListPage, MemoryStore, ObjectRecord, ObjectStore, S3Store, StoreError};
pub use transfer::{TransferFailure, TransferStage, TransferWorker};

//! Replication orchestrator - main workflow coordinator.

mod aggregator;
mod pools;
mod retry;

pub use aggregator::{AggregatorHandle, ErrorSink, FailureSender, FAILURE_CHANNEL_CAPACITY};
pub use pools::{PageOutcome, PageTask, PoolSummary, WorkerPool};
pub use retry::{RetryOutcome, RetryProcessor};

use crate::config::Config;
use crate::error::{ReplicateError, Result, EXIT_UNRECOVERED_OBJECTS};
use crate::source::Paginator;
use crate::state::CheckpointStore;
use crate::store::{S3Store, SharedStore, START_CURSOR};
use crate::transfer::TransferWorker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Replication orchestrator.
pub struct Orchestrator {
    config: Config,
    source: SharedStore,
    dest: SharedStore,
}

/// Result of a replication run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "completed", "completed_with_failures" or "failed".
    pub status: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Listing pages fetched successfully.
    pub pages_listed: usize,

    /// Objects enumerated across all pages.
    pub objects_listed: usize,

    /// Objects transferred in the main pass.
    pub objects_synced: usize,

    /// Bytes written to the destination, main pass and retry pass together.
    pub bytes_synced: u64,

    /// Objects that failed in the main pass.
    pub objects_failed: usize,

    /// Failed objects that succeeded on retry.
    pub objects_resynced: usize,

    /// Objects that failed on retry as well.
    pub objects_unrecovered: usize,

    /// Keys of the unrecovered objects.
    pub unrecovered_keys: Vec<String>,

    /// Marker persisted for the next run, if the listing stopped early.
    pub resume_cursor: Option<String>,
}

/// Report of a finished session together with the error that stopped it, if any.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Counts and timings, filled in even when the session failed.
    pub report: SyncReport,
    /// Listing, checkpoint or internal failure.
    pub error: Option<ReplicateError>,
}

impl SessionOutcome {
    pub fn into_result(self) -> Result<SyncReport> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.report),
        }
    }
}

/// Totals from the retry pass.
#[derive(Debug, Default)]
struct RetrySummary {
    resynced: usize,
    bytes: u64,
    unrecovered: Vec<String>,
}

impl Orchestrator {
    /// Create an orchestrator with S3 clients for both buckets.
    pub async fn connect(config: Config) -> Result<Self> {
        let source = S3Store::connect(&config.source).await?;
        let dest = S3Store::connect(&config.dest).await?;
        Ok(Self::with_stores(config, Arc::new(source), Arc::new(dest)))
    }

    /// Create an orchestrator over already-built stores.
    pub fn with_stores(config: Config, source: SharedStore, dest: SharedStore) -> Self {
        Self {
            config,
            source,
            dest,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one replication session.
    ///
    /// Per-object failures never fail the session; they are retried once and
    /// reported in the returned [`SyncReport`]. A listing failure stops
    /// enumeration, persists the marker to resume from and is returned as an
    /// error after in-flight pages and the retry pass have finished.
    pub async fn run(self) -> Result<SyncReport> {
        self.execute().await.into_result()
    }

    /// Run one replication session, keeping the report when it fails.
    ///
    /// The retry pass always runs, even when listing or the checkpoint file
    /// failed. The first error wins: listing, then checkpoint, then internal.
    pub async fn execute(self) -> SessionOutcome {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let sync = &self.config.sync;

        info!("Starting replication run: {}", run_id);
        info!(
            "Replicating {} -> {} with {} page tasks",
            self.source.bucket(),
            self.dest.bucket(),
            sync.threads
        );

        let checkpoint = CheckpointStore::new(&sync.checkpoint_file);
        let mut cursor = checkpoint.read();
        if cursor != START_CURSOR {
            info!("Resuming listing from marker: {}", cursor);
        }

        let worker = Arc::new(
            TransferWorker::new(self.source.clone(), self.dest.clone())
                .with_mirror(sync.download_dir.clone()),
        );
        if let Some(ref dir) = sync.download_dir {
            info!("Mirroring objects to {:?}", dir);
        }

        let paginator = Paginator::new(self.source.clone(), sync.prefix.clone(), sync.page_size);
        let (failures, aggregator) = aggregator::start(FAILURE_CHANNEL_CAPACITY);
        let mut pool = WorkerPool::new(sync.threads, worker.clone(), failures);

        // Main pass: list and dispatch until the listing ends or fails
        let mut pages_listed = 0;
        let mut objects_listed = 0;
        let mut halted: Option<ReplicateError> = None;
        loop {
            let page = match paginator.fetch_page(&cursor).await {
                Ok(page) => page,
                Err(e) => {
                    error!("{}", e);
                    halted = Some(e);
                    break;
                }
            };

            pages_listed += 1;
            objects_listed += page.records.len();
            let next_cursor = page.next_cursor;

            if let Err(e) = pool.dispatch(PageTask::new(pages_listed, page.records)).await {
                error!("{}", e);
                halted = Some(e);
                break;
            }

            if next_cursor == START_CURSOR {
                break;
            }
            cursor = next_cursor;
        }

        // Join barrier: nothing below runs while a page task is still active
        let summary = pool.join().await;

        let mut checkpoint_error = None;
        let resume_cursor = if halted.is_some() {
            match checkpoint.write(&cursor) {
                Ok(()) => (cursor != START_CURSOR).then(|| {
                    warn!(
                        "Listing stopped early, next run resumes from marker '{}' ({:?})",
                        cursor,
                        checkpoint.path()
                    );
                    cursor.clone()
                }),
                Err(e) => {
                    error!("{}", e);
                    checkpoint_error = Some(e);
                    None
                }
            }
        } else {
            if let Err(e) = checkpoint.clear() {
                error!("{}", e);
                checkpoint_error = Some(e);
            }
            None
        };

        let mut internal_error = None;
        let sink = match aggregator.snapshot().await {
            Ok(sink) => sink,
            Err(e) => {
                error!("{}", e);
                internal_error = Some(e);
                ErrorSink::default()
            }
        };
        let retry = if sink.is_empty() {
            RetrySummary::default()
        } else {
            info!("Retrying {} failed objects", sink.len());
            retry_failures(worker, sink).await
        };

        if summary.panicked > 0 && internal_error.is_none() {
            internal_error = Some(ReplicateError::pool(
                format!("{} page tasks panicked", summary.panicked),
                "joining page tasks",
            ));
        }
        let error = halted.or(checkpoint_error).or(internal_error);

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let status = if error.is_some() {
            "failed"
        } else if !retry.unrecovered.is_empty() {
            "completed_with_failures"
        } else {
            "completed"
        };

        let report = SyncReport {
            run_id,
            status: status.to_string(),
            started_at,
            completed_at,
            duration_seconds: duration,
            pages_listed,
            objects_listed,
            objects_synced: summary.objects_synced,
            bytes_synced: summary.bytes_synced + retry.bytes,
            objects_failed: summary.objects_failed,
            objects_resynced: retry.resynced,
            objects_unrecovered: retry.unrecovered.len(),
            unrecovered_keys: retry.unrecovered,
            resume_cursor,
        };

        info!(
            "Replication {}: {} objects listed, {} synced, {} resynced, {} unrecovered in {:.1}s",
            report.status,
            report.objects_listed,
            report.objects_synced,
            report.objects_resynced,
            report.objects_unrecovered,
            report.duration_seconds
        );

        SessionOutcome { report, error }
    }
}

/// Retry every failure once and collect the outcomes.
///
/// Reads exactly one outcome per failure; if the retry task stops early the
/// keys it never reported count as unrecovered.
async fn retry_failures(worker: Arc<TransferWorker>, sink: ErrorSink) -> RetrySummary {
    let keys = sink.keys();
    let (mut outcomes, handle) = RetryProcessor::new(worker).spawn(sink);

    let mut summary = RetrySummary::default();
    let mut resynced = HashSet::new();
    for _ in 0..keys.len() {
        let Some(outcome) = outcomes.recv().await else {
            break;
        };
        if let RetryOutcome::Resynced { key, bytes } = outcome {
            info!("resynced: {}", key);
            summary.resynced += 1;
            summary.bytes += bytes;
            resynced.insert(key);
        }
    }
    drop(outcomes);

    if let Err(e) = handle.await {
        error!("Retry task panicked - {}", e);
    }

    summary.unrecovered = keys.into_iter().filter(|k| !resynced.contains(k)).collect();
    summary
}

impl SyncReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether some objects never reached the destination.
    pub fn has_unrecovered(&self) -> bool {
        self.objects_unrecovered > 0
    }

    /// Process exit code for a run that returned a report.
    pub fn exit_code(&self) -> u8 {
        if self.has_unrecovered() {
            EXIT_UNRECOVERED_OBJECTS
        } else {
            0
        }
    }
}

//! Bounded pool of page tasks.
//!
//! A page task owns one page of records and transfers them one after another.
//! At most `capacity` page tasks run at once; dispatching another waits for a
//! free slot, in FIFO order. [`WorkerPool::join`] is the barrier after which no
//! page task is running.

use super::aggregator::FailureSender;
use crate::error::{ReplicateError, Result};
use crate::store::ObjectRecord;
use crate::transfer::TransferWorker;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One listing page scheduled for transfer.
#[derive(Debug, Clone)]
pub struct PageTask {
    /// 1-based position of the page in this run.
    pub page: usize,
    /// Records in listing order.
    pub records: Vec<ObjectRecord>,
}

impl PageTask {
    pub fn new(page: usize, records: Vec<ObjectRecord>) -> Self {
        Self { page, records }
    }

    fn name(&self) -> String {
        format!("page-{}", self.page)
    }

    /// Transfer every record in order. Failures are reported and skipped.
    async fn run(self, worker: &TransferWorker, failures: &FailureSender) -> PageOutcome {
        let mut outcome = PageOutcome::default();

        for record in &self.records {
            match worker.transfer(record).await {
                Ok(bytes) => {
                    info!("synced: {}", record.key);
                    outcome.synced += 1;
                    outcome.bytes += bytes;
                }
                Err(failure) => {
                    warn!("{}", failure);
                    outcome.failed += 1;
                    failures.report(failure).await;
                }
            }
        }

        outcome
    }
}

/// Counts from one finished page task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOutcome {
    pub synced: usize,
    pub bytes: u64,
    pub failed: usize,
}

/// Totals over every page task of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    /// Page tasks that ran to completion.
    pub pages: usize,
    /// Page tasks that panicked.
    pub panicked: usize,
    pub objects_synced: usize,
    pub bytes_synced: u64,
    pub objects_failed: usize,
}

/// Page tasks in flight, gated by a semaphore.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    worker: Arc<TransferWorker>,
    failures: FailureSender,
    handles: Vec<(String, JoinHandle<PageOutcome>)>,
}

impl WorkerPool {
    /// Create a pool running at most `capacity` page tasks at once (minimum 1).
    pub fn new(capacity: usize, worker: Arc<TransferWorker>, failures: FailureSender) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            worker,
            failures,
            handles: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of page tasks dispatched so far.
    pub fn dispatched(&self) -> usize {
        self.handles.len()
    }

    /// Wait for a free slot, then start `task` in the background.
    ///
    /// The slot is held until the task's last record is done.
    pub async fn dispatch(&mut self, task: PageTask) -> Result<()> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ReplicateError::pool(e.to_string(), "acquiring page task slot"))?;

        let name = task.name();
        debug!("Dispatching {} with {} objects", name, task.records.len());

        let worker = self.worker.clone();
        let failures = self.failures.clone();
        let handle = tokio::spawn(async move {
            let outcome = task.run(&worker, &failures).await;
            drop(permit);
            outcome
        });

        self.handles.push((name, handle));
        Ok(())
    }

    /// Wait for every dispatched page task to finish.
    ///
    /// Drops the pool's failure sender first, so the aggregator can close once
    /// the last task is done.
    pub async fn join(self) -> PoolSummary {
        let WorkerPool {
            failures, handles, ..
        } = self;
        drop(failures);

        let mut summary = PoolSummary::default();
        for (name, handle) in handles {
            match handle.await {
                Ok(outcome) => {
                    debug!(
                        "{}: {} synced, {} failed",
                        name, outcome.synced, outcome.failed
                    );
                    summary.pages += 1;
                    summary.objects_synced += outcome.synced;
                    summary.bytes_synced += outcome.bytes;
                    summary.objects_failed += outcome.failed;
                }
                Err(e) => {
                    error!("{}: task panicked - {}", name, e);
                    summary.panicked += 1;
                }
            }
        }
        summary
    }
}

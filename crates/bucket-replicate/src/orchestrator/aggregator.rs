//! Single owner of the per-object failure list.
//!
//! Page tasks never touch the list directly: they send failures through a
//! cloned [`FailureSender`], and one spawned task appends them in arrival
//! order. Once every sender is dropped the task ends and its list becomes the
//! frozen [`ErrorSink`].

use crate::error::{ReplicateError, Result};
use crate::transfer::TransferFailure;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Buffered failures before senders wait on the aggregator.
pub const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// Start the aggregator task.
pub fn start(capacity: usize) -> (FailureSender, AggregatorHandle) {
    let (tx, mut rx) = mpsc::channel::<TransferFailure>(capacity.max(1));

    let handle = tokio::spawn(async move {
        let mut failures = Vec::new();
        while let Some(failure) = rx.recv().await {
            failures.push(failure);
        }
        debug!("Error aggregator closed with {} failures", failures.len());
        failures
    });

    (FailureSender { tx }, AggregatorHandle { handle })
}

/// Cloneable handle page tasks use to report failures.
#[derive(Debug, Clone)]
pub struct FailureSender {
    tx: mpsc::Sender<TransferFailure>,
}

impl FailureSender {
    /// Hand a failure to the aggregator, waiting if its buffer is full.
    pub async fn report(&self, failure: TransferFailure) {
        if let Err(e) = self.tx.send(failure).await {
            error!("Error aggregator is gone, dropping failure: {}", e.0);
        }
    }
}

/// Owner side of the aggregator task.
#[derive(Debug)]
pub struct AggregatorHandle {
    handle: JoinHandle<Vec<TransferFailure>>,
}

impl AggregatorHandle {
    /// Wait for every sender to be dropped and take the collected failures.
    pub async fn snapshot(self) -> Result<ErrorSink> {
        self.handle
            .await
            .map(ErrorSink)
            .map_err(|e| ReplicateError::pool(e.to_string(), "error aggregator task"))
    }
}

/// Frozen list of failed transfers, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ErrorSink(Vec<TransferFailure>);

impl ErrorSink {
    /// Number of failed transfers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the main pass had no failures.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransferFailure> {
        self.0.iter()
    }

    /// Keys of the failed objects.
    pub fn keys(&self) -> Vec<String> {
        self.0.iter().map(|f| f.key().to_string()).collect()
    }

    pub fn into_records(self) -> Vec<TransferFailure> {
        self.0
    }
}

impl From<Vec<TransferFailure>> for ErrorSink {
    fn from(failures: Vec<TransferFailure>) -> Self {
        Self(failures)
    }
}

//! Second, sequential attempt for every object that failed in the main pass.

use super::aggregator::ErrorSink;
use crate::transfer::TransferWorker;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

/// Result of one retry attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The object reached the destination this time.
    Resynced { key: String, bytes: u64 },
    /// The object failed again and is given up on.
    Failed { key: String, cause: String },
}

impl RetryOutcome {
    pub fn key(&self) -> &str {
        match self {
            RetryOutcome::Resynced { key, .. } | RetryOutcome::Failed { key, .. } => key,
        }
    }
}

/// Re-runs failed transfers one at a time, exactly once each.
pub struct RetryProcessor {
    worker: Arc<TransferWorker>,
}

impl RetryProcessor {
    pub fn new(worker: Arc<TransferWorker>) -> Self {
        Self { worker }
    }

    /// Start retrying `sink` in the background.
    ///
    /// The receiver yields one outcome per failure, in sink order, and closes
    /// once all of them have been sent.
    pub fn spawn(self, sink: ErrorSink) -> (mpsc::Receiver<RetryOutcome>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(sink.len().clamp(1, 64));

        let handle = tokio::spawn(async move {
            for failure in sink.into_records() {
                let result = self.worker.transfer(&failure.record).await;
                let outcome = match result {
                    Ok(bytes) => RetryOutcome::Resynced {
                        key: failure.record.key,
                        bytes,
                    },
                    Err(again) => {
                        error!("retry failed: {}", again);
                        RetryOutcome::Failed {
                            key: again.record.key,
                            cause: again.cause,
                        }
                    }
                };

                if tx.send(outcome).await.is_err() {
                    break;
                }
            }
        });

        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ObjectRecord};
    use crate::transfer::{TransferFailure, TransferStage};

    fn sink(keys: &[&str]) -> ErrorSink {
        keys.iter()
            .map(|k| TransferFailure {
                record: ObjectRecord::new(*k, 0),
                stage: TransferStage::Put,
                cause: "first attempt".to_string(),
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[tokio::test]
    async fn test_one_outcome_per_failure_in_order() {
        let source = Arc::new(MemoryStore::new("origin"));
        source.insert("b", "bee");
        source.insert("d", "dee");
        let dest = Arc::new(MemoryStore::new("replica"));
        dest.fail_put("d", 1);
        let worker = Arc::new(TransferWorker::new(source, dest.clone()));

        let (mut rx, handle) = RetryProcessor::new(worker).spawn(sink(&["b", "d", "missing"]));
        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        handle.await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[0],
            RetryOutcome::Resynced {
                key: "b".to_string(),
                bytes: 3
            }
        );
        assert!(matches!(outcomes[1], RetryOutcome::Failed { ref key, .. } if key == "d"));
        assert_eq!(outcomes[2].key(), "missing");
        // No second retry of "d" even though its fault is used up
        assert_eq!(dest.put_log(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_empty_sink_closes_immediately() {
        let worker = Arc::new(TransferWorker::new(
            Arc::new(MemoryStore::new("origin")),
            Arc::new(MemoryStore::new("replica")),
        ));
        let (mut rx, handle) = RetryProcessor::new(worker).spawn(ErrorSink::default());
        assert!(rx.recv().await.is_none());
        handle.await.unwrap();
    }
}

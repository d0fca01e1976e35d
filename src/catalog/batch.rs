//! Chunked batch loading with a fixed-window limiter.
//!
//! A batch runs as its own task. Every request in a chunk is issued
//! concurrently, then the limiter waits a fixed delay before the next chunk.
//! Progress is published on a watch channel and the task can be aborted.

use crate::config::BatchConfig;
use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowLimiter {
    chunk_size: usize,
    delay: Duration,
}

impl FixedWindowLimiter {
    /// `chunk_size` of zero is treated as one.
    pub fn new(chunk_size: usize, delay: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            delay,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_delay())
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub chunks_done: usize,
}

impl BatchProgress {
    pub fn is_complete(&self) -> bool {
        self.succeeded + self.failed == self.total
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub progress: BatchProgress,
    /// Keys that failed, with the error message
    pub failures: Vec<(String, String)>,
}

/// Handle to a running batch.
pub struct BatchHandle {
    progress: watch::Receiver<BatchProgress>,
    task: JoinHandle<BatchReport>,
}

impl BatchHandle {
    pub fn progress(&self) -> BatchProgress {
        *self.progress.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.progress.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    pub async fn wait(self) -> Result<BatchReport> {
        self.task
            .await
            .map_err(|e| anyhow!("Batch task did not complete: {}", e))
    }
}

/// Runs `load` over every key, one chunk at a time.
///
/// Individual failures are recorded in the report and never stop the batch.
pub fn spawn_batch<F, Fut>(keys: Vec<String>, limiter: FixedWindowLimiter, load: F) -> BatchHandle
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let total = keys.len();
    let (progress_tx, progress_rx) = watch::channel(BatchProgress { total, ..BatchProgress::default() });
    let load = Arc::new(load);

    let task = tokio::spawn(async move {
        let mut failures = Vec::new();
        let chunk_count = keys.chunks(limiter.chunk_size()).count();

        for (index, chunk) in keys.chunks(limiter.chunk_size()).enumerate() {
            let mut in_flight = JoinSet::new();
            for key in chunk {
                let load = Arc::clone(&load);
                let key = key.clone();
                in_flight.spawn(async move {
                    let result = load(key.clone()).await;
                    (key, result)
                });
            }

            while let Some(joined) = in_flight.join_next().await {
                let outcome = match joined {
                    Ok((key, Ok(()))) => Ok(key),
                    Ok((key, Err(e))) => Err((key, e.to_string())),
                    Err(e) => Err(("<task>".to_string(), e.to_string())),
                };
                match outcome {
                    Ok(_) => progress_tx.send_modify(|p| p.succeeded += 1),
                    Err(failure) => {
                        warn!("Batch item {} failed: {}", failure.0, failure.1);
                        progress_tx.send_modify(|p| p.failed += 1);
                        failures.push(failure);
                    }
                }
            }

            progress_tx.send_modify(|p| p.chunks_done += 1);
            debug!("Batch chunk {}/{} done", index + 1, chunk_count);

            if index + 1 < chunk_count {
                tokio::time::sleep(limiter.delay()).await;
            }
        }

        let progress = *progress_tx.borrow();
        info!(
            total = progress.total,
            succeeded = progress.succeeded,
            failed = progress.failed,
            "Batch complete"
        );
        BatchReport { progress, failures }
    });

    BatchHandle { progress: progress_rx, task }
}

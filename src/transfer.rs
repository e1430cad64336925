// src/transfer.rs
//
// Transfer tasks and the per-batch summary shared by the upload and download paths.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::blob_store::ObjectRef;
use crate::error::TransferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::Upload => f.write_str("upload"),
            TransferDirection::Download => f.write_str("download"),
        }
    }
}

/// One local path paired with one remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub local: PathBuf,
    pub remote: ObjectRef,
    pub direction: TransferDirection,
}

impl TransferTask {
    pub fn upload(local: PathBuf, remote: ObjectRef) -> Self {
        Self { local, remote, direction: TransferDirection::Upload }
    }

    pub fn download(remote: ObjectRef, local: PathBuf) -> Self {
        Self { local, remote, direction: TransferDirection::Download }
    }
}

impl fmt::Display for TransferTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            TransferDirection::Upload => write!(f, "{} -> {}", self.local.display(), self.remote),
            TransferDirection::Download => write!(f, "{} -> {}", self.remote, self.local.display()),
        }
    }
}

/// Terminal result of one task, as produced by a worker.
#[derive(Debug)]
pub struct TaskOutcome {
    pub task: TransferTask,
    pub result: Result<u64, TransferError>,
}

/// A task that ended in error.
#[derive(Debug)]
pub struct FailedTransfer {
    pub task: TransferTask,
    pub error: TransferError,
}

/// Aggregate result of one upload or download batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Tasks enumerated for the batch.
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedTransfer>,
    /// Tasks never started because the run was cancelled.
    pub not_started: usize,
    /// Bytes moved by successful tasks.
    pub bytes: u64,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub(crate) fn from_outcomes(
        total: usize,
        outcomes: Vec<TaskOutcome>,
        not_started: usize,
        elapsed: Duration,
    ) -> Self {
        let mut summary = BatchSummary { total, not_started, elapsed, ..Default::default() };
        for outcome in outcomes {
            match outcome.result {
                Ok(bytes) => {
                    summary.succeeded += 1;
                    summary.bytes += bytes;
                }
                Err(error) => summary.failed.push(FailedTransfer { task: outcome.task, error }),
            }
        }
        summary
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True when every enumerated task finished successfully.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.not_started == 0
    }

    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { (self.bytes as f64 / 1_048_576.0) / secs } else { 0.0 }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} transfers failed ({} succeeded, {} bytes in {:.2}s)",
            self.failed.len(),
            self.total,
            self.succeeded,
            self.bytes,
            self.elapsed.as_secs_f64()
        )?;
        if self.not_started > 0 {
            write!(f, ", {} not started", self.not_started)?;
        }
        Ok(())
    }
}

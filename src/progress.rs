// src/progress.rs
//
// indicatif progress bar for batch transfers.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Byte-and-object progress for one batch.
pub struct TransferProgressTracker {
    pub progress_bar: ProgressBar,
}

impl TransferProgressTracker {
    /// `total_bytes` may be 0 when unknown up front (downloads).
    pub fn new(operation: &str, total_objects: u64, total_bytes: u64) -> Self {
        let pb = ProgressBar::new(total_bytes);
        let template = format!(
            "{}: {{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}) {{msg}}",
            operation
        );
        // A broken template only loses the styling, never the bar.
        if let Ok(style) = ProgressStyle::default_bar().template(&template) {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        pb.set_message(format!("0/{} objects", total_objects));
        Self { progress_bar: pb }
    }

    /// Tracker that draws nothing, for quiet runs.
    pub fn hidden() -> Self {
        Self { progress_bar: ProgressBar::hidden() }
    }

    pub fn update(&self, bytes_transferred: u64, objects_completed: u64, total_objects: u64) {
        if self.progress_bar.length().unwrap_or(0) < bytes_transferred {
            self.progress_bar.set_length(bytes_transferred);
        }
        self.progress_bar.set_position(bytes_transferred);
        self.progress_bar.set_message(format!("{}/{} objects", objects_completed, total_objects));
    }

    pub fn finish(&self, operation: &str, total_bytes: u64, duration: Duration) {
        let secs = duration.as_secs_f64();
        let mib = total_bytes as f64 / 1_048_576.0;
        let throughput = if secs > 0.0 { mib / secs } else { 0.0 };
        self.progress_bar.finish_with_message(format!(
            "{} complete! {:.2} MB in {:.2}s ({:.2} MB/s)",
            operation, mib, secs, throughput
        ));
    }
}

/// Shared counter the coordinators report into.
pub struct ProgressCallback {
    tracker: TransferProgressTracker,
    objects_completed: AtomicU64,
    bytes_transferred: AtomicU64,
    total_objects: AtomicU64,
}

impl ProgressCallback {
    pub fn new(tracker: TransferProgressTracker) -> Self {
        Self {
            tracker,
            objects_completed: AtomicU64::new(0),
            bytes_transferred: AtomicU64::new(0),
            total_objects: AtomicU64::new(0),
        }
    }

    /// Called by a coordinator once the task list is known.
    pub fn set_total_objects(&self, total: u64) {
        self.total_objects.store(total, Ordering::Relaxed);
        self.tracker.update(
            self.bytes_transferred.load(Ordering::Relaxed),
            self.objects_completed.load(Ordering::Relaxed),
            total,
        );
    }

    /// Called when one object transfer completes successfully.
    pub fn object_completed(&self, bytes: u64) {
        let completed = self.objects_completed.fetch_add(1, Ordering::Relaxed) + 1;
        let total_bytes = self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.tracker.update(total_bytes, completed, self.total_objects.load(Ordering::Relaxed));
    }

    pub fn objects_completed(&self) -> u64 {
        self.objects_completed.load(Ordering::Relaxed)
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }

    pub fn finish(&self, operation: &str, duration: Duration) {
        self.tracker.finish(operation, self.bytes_transferred(), duration);
    }
}

// src/upload.rs
//
// Batch upload of a local file or directory tree into one container.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::blob_store::{BlobStore, ObjectRef};
use crate::block_upload::ChunkedUploader;
use crate::concurrency::WorkerPool;
use crate::config::TransferConfig;
use crate::error::{Result, TransferError};
use crate::name_mapper::NameMapper;
use crate::progress::ProgressCallback;
use crate::transfer::{BatchSummary, TaskOutcome, TransferTask};

/// Uploads every regular file under a root through a fixed worker pool.
pub struct UploadCoordinator {
    store: Arc<dyn BlobStore>,
    config: TransferConfig,
    cancel: CancellationToken,
    progress: Option<Arc<ProgressCallback>>,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn BlobStore>, config: TransferConfig) -> Self {
        Self { store, config, cancel: CancellationToken::new(), progress: None }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Upload `root_path` (file or directory) into `container`.
    ///
    /// Setup failures (missing root or container, unreadable tree) abort before any
    /// block is staged. Per-file failures are reported in the summary.
    pub async fn upload_batch(&self, root_path: &Path, container: &str) -> Result<BatchSummary> {
        let started = Instant::now();
        let mapper = NameMapper::for_root(root_path)?;

        if !self.store.container_exists(container).await? {
            return Err(TransferError::NotFound(format!("container {container}")));
        }

        let files = enumerate_local_files(root_path)?;
        let mut tasks = Vec::with_capacity(files.len());
        for file in files {
            let key = mapper.remote_key(&file)?;
            tasks.push(TransferTask::upload(file, ObjectRef::new(container, key)));
        }
        let total = tasks.len();
        info!(
            "uploading {} files from {} to {} with {} workers",
            total,
            root_path.display(),
            container,
            self.config.concurrency
        );
        if let Some(p) = &self.progress {
            p.set_total_objects(total as u64);
        }

        let pool = WorkerPool::new(self.config.concurrency)
            .with_queue_capacity(self.config.queue_capacity)
            .with_cancellation(self.cancel.clone());

        let store = Arc::clone(&self.store);
        let chunk_size = self.config.chunk_size;
        let cancel = self.cancel.clone();
        let progress = self.progress.clone();

        let run = pool
            .run(tasks, move |task: TransferTask| {
                let store = Arc::clone(&store);
                let cancel = cancel.clone();
                let progress = progress.clone();
                async move {
                    let result = ChunkedUploader::new(store.as_ref())
                        .with_chunk_size(chunk_size)
                        .with_cancellation(cancel)
                        .upload(&task.local, &task.remote)
                        .await
                        .map(|report| report.bytes);
                    match &result {
                        Ok(bytes) => {
                            if let Some(p) = &progress {
                                p.object_completed(*bytes);
                            }
                        }
                        Err(e) => warn!("upload {} failed: {}", task, e),
                    }
                    TaskOutcome { task, result }
                }
            })
            .await?;

        let summary = BatchSummary::from_outcomes(total, run.outputs, run.not_started, started.elapsed());
        info!("upload to {} finished: {}", container, summary);
        Ok(summary)
    }
}

/// Convenience wrapper around [`UploadCoordinator::upload_batch`].
pub async fn upload_batch(
    store: Arc<dyn BlobStore>,
    root_path: &Path,
    container: &str,
    config: &TransferConfig,
) -> Result<BatchSummary> {
    UploadCoordinator::new(store, config.clone()).upload_batch(root_path, container).await
}

/// Every regular file under `root`, or `root` itself when it is a file.
///
/// Any walk error fails the whole enumeration.
pub fn enumerate_local_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            match e.into_io_error() {
                Some(io) => TransferError::local(path, io),
                None => TransferError::Validation(format!("filesystem loop at {}", path.display())),
            }
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

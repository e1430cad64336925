// src/download.rs
//
// Batch download of every object under a prefix into a local directory.
//
// Listing completes before any fetch starts. Fetches then run through the same bounded
// worker pool as uploads, and the batch call returns only after every worker exited.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blob_store::{BlobStore, ByteStream, ObjectRef, ResourceKind};
use crate::concurrency::WorkerPool;
use crate::config::TransferConfig;
use crate::constants::DEFAULT_WRITE_BUFFER_SIZE;
use crate::error::{Result, TransferError};
use crate::listing::PaginatedLister;
use crate::name_mapper::remote_key_to_local_path;
use crate::progress::ProgressCallback;
use crate::transfer::{BatchSummary, TaskOutcome, TransferTask};

/// Downloads a prefix of a container through a fixed worker pool.
pub struct DownloadCoordinator {
    store: Arc<dyn BlobStore>,
    config: TransferConfig,
    cancel: CancellationToken,
    progress: Option<Arc<ProgressCallback>>,
}

impl DownloadCoordinator {
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

    /// Download every object in `container` whose key starts with `prefix` into
    /// `root_path`. A prefix matching nothing is a successful, empty batch.
    pub async fn download_batch(&self, container: &str, prefix: &str, root_path: &Path) -> Result<BatchSummary> {
        let started = Instant::now();

        if !self.store.container_exists(container).await? {
            return Err(TransferError::NotFound(format!("container {container}")));
        }

        let kind = ResourceKind::Objects { container: container.to_string() };
        let keys = PaginatedLister::new(self.store.as_ref())
            .with_page_size(self.config.page_size)
            .list_all(&kind, prefix)
            .await?;

        let mut tasks = Vec::with_capacity(keys.len());
        let mut claimed = HashSet::with_capacity(keys.len());
        for key in keys {
            let local = remote_key_to_local_path(root_path, &key)?;
            // Keys like "a//b" and "a/b" land on the same file.
            if !claimed.insert(local.clone()) {
                return Err(TransferError::Validation(format!(
                    "object {key:?} maps to {} which another object in {container} already uses",
                    local.display()
                )));
            }
            tasks.push(TransferTask::download(ObjectRef::new(container, key), local));
        }
        let total = tasks.len();
        info!(
            "downloading {} objects from {} (prefix {:?}) to {} with {} workers",
            total,
            container,
            prefix,
            root_path.display(),
            self.config.concurrency
        );
        if let Some(p) = &self.progress {
            p.set_total_objects(total as u64);
        }

        let pool = WorkerPool::new(self.config.concurrency)
            .with_queue_capacity(self.config.queue_capacity)
            .with_cancellation(self.cancel.clone());

        let store = Arc::clone(&self.store);
        let cancel = self.cancel.clone();
        let progress = self.progress.clone();

        let run = pool
            .run(tasks, move |task: TransferTask| {
                let store = Arc::clone(&store);
                let cancel = cancel.clone();
                let progress = progress.clone();
                async move {
                    let result = download_object(store.as_ref(), &task.remote, &task.local, &cancel).await;
                    match &result {
                        Ok(bytes) => {
                            if let Some(p) = &progress {
                                p.object_completed(*bytes);
                            }
                        }
                        Err(e) => warn!("download {} failed: {}", task, e),
                    }
                    TaskOutcome { task, result }
                }
            })
            .await?;

        let summary = BatchSummary::from_outcomes(total, run.outputs, run.not_started, started.elapsed());
        info!("download from {} finished: {}", container, summary);
        Ok(summary)
    }
}

/// Convenience wrapper around [`DownloadCoordinator::download_batch`].
pub async fn download_batch(
    store: Arc<dyn BlobStore>,
    container: &str,
    prefix: &str,
    root_path: &Path,
    config: &TransferConfig,
) -> Result<BatchSummary> {
    DownloadCoordinator::new(store, config.clone()).download_batch(container, prefix, root_path).await
}

/// Stream one object into `local`, creating parent directories.
///
/// Bytes land in a hidden sibling file that is renamed over `local` only after the
/// stream completes, so a failed or cancelled fetch leaves any existing file untouched.
pub async fn download_object(
    store: &dyn BlobStore,
    object: &ObjectRef,
    local: &Path,
    cancel: &CancellationToken,
) -> Result<u64> {
    if cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }
    let mut stream = store.open_read(object).await?;

    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent).await.map_err(|e| TransferError::local(parent, e))?;
    }
    let part = partial_path(local)?;
    let written = match write_stream(&mut stream, &part, cancel).await {
        Ok(written) => written,
        Err(e) => {
            discard_partial(&part).await;
            return Err(e);
        }
    };
    if let Err(e) = fs::rename(&part, local).await {
        discard_partial(&part).await;
        return Err(TransferError::local(local, e));
    }

    debug!("downloaded {} ({} bytes) to {}", object, written, local.display());
    Ok(written)
}

/// Hidden sibling of `local` that receives the bytes until the fetch completes.
fn partial_path(local: &Path) -> Result<PathBuf> {
    let name = local
        .file_name()
        .ok_or_else(|| TransferError::Validation(format!("no file name in {}", local.display())))?;
    Ok(local.with_file_name(format!(".{}.{}.part", name.to_string_lossy(), Uuid::new_v4())))
}

async fn discard_partial(part: &Path) {
    if let Err(rm) = fs::remove_file(part).await {
        if rm.kind() != std::io::ErrorKind::NotFound {
            debug!("could not remove partial file {}: {}", part.display(), rm);
        }
    }
}

async fn write_stream(stream: &mut ByteStream, part: &Path, cancel: &CancellationToken) -> Result<u64> {
    let file = fs::File::create(part).await.map_err(|e| TransferError::local(part, e))?;
    let mut writer = BufWriter::with_capacity(DEFAULT_WRITE_BUFFER_SIZE, file);

    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        writer.write_all(&chunk).await.map_err(|e| TransferError::local(part, e))?;
        written += chunk.len() as u64;
    }
    writer.flush().await.map_err(|e| TransferError::local(part, e))?;
    Ok(written)
}

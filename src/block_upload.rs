// src/block_upload.rs
//
// Chunked block upload of a single local file.
//
// The file is read sequentially in `chunk_size` pieces. Every non-empty piece is staged
// under a fresh block id and the ids are kept in read order; the ordered list is then
// committed in one call, which is the moment the object becomes visible.
//
// A failure before the commit leaves only uncommitted blocks behind. Those are not
// addressable and expire with the service's staging area, so nothing is cleaned up here.

use std::path::Path;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::blob_store::{BlobStore, BlockId, ObjectRef};
use crate::constants::DEFAULT_CHUNK_SIZE;
use crate::error::{Result, TransferError};

/// Outcome of one committed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadReport {
    /// Number of blocks in the committed list.
    pub blocks: usize,
    pub bytes: u64,
}

/// Stages a file as blocks and commits the ordered block list.
pub struct ChunkedUploader<'a> {
    store: &'a dyn BlobStore,
    chunk_size: usize,
    cancel: CancellationToken,
}

impl<'a> ChunkedUploader<'a> {
    pub fn new(store: &'a dyn BlobStore) -> Self {
        Self { store, chunk_size: DEFAULT_CHUNK_SIZE, cancel: CancellationToken::new() }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn upload(&self, file_path: &Path, object: &ObjectRef) -> Result<UploadReport> {
        if self.chunk_size == 0 {
            return Err(TransferError::Validation("chunk size must be at least 1 byte".into()));
        }
        debug!("upload {} -> {}", file_path.display(), object);

        let mut file = File::open(file_path)
            .await
            .map_err(|e| TransferError::local(file_path, e))?;

        let mut block_ids: Vec<BlockId> = Vec::new();
        let mut total: u64 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let chunk = read_chunk(&mut file, self.chunk_size)
                .await
                .map_err(|e| TransferError::local(file_path, e))?;
            if chunk.is_empty() {
                break;
            }

            let block_id = BlockId::generate();
            let len = chunk.len();
            self.store.stage_block(object, &block_id, chunk).await?;
            debug!("staged block #{} ({} bytes) id {} for {}", block_ids.len(), len, block_id, object);

            block_ids.push(block_id);
            total += len as u64;
        }

        self.store.commit_block_list(object, &block_ids).await?;
        info!("committed {} ({} blocks, {} bytes)", object, block_ids.len(), total);

        Ok(UploadReport { blocks: block_ids.len(), bytes: total })
    }
}

/// Upload `file_path` to `object` with the given chunk size.
pub async fn upload_file(
    store: &dyn BlobStore,
    file_path: &Path,
    object: &ObjectRef,
    chunk_size: usize,
) -> Result<UploadReport> {
    ChunkedUploader::new(store).with_chunk_size(chunk_size).upload(file_path, object).await
}

/// Read until `chunk_size` bytes are buffered or the file ends.
async fn read_chunk(file: &mut File, chunk_size: usize) -> std::io::Result<Bytes> {
    let mut buf = vec![0u8; chunk_size];
    let mut filled = 0;
    while filled < chunk_size {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

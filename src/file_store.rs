// src/file_store.rs
//
// FileSystemBlobStore: a directory-backed emulation of a block blob service.
//
// Layout under the store root:
//   <root>/<container>/<key path>                       committed objects
//   <root>/.staging/<container>/<key id>/<block id>     staged, uncommitted blocks
//
// Names starting with '.' are reserved, so the staging area never shows up as a
// container. An object only appears under its container once its block list is
// committed; the commit writes a temp file in the staging area and renames it into
// place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, trace};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::blob_store::{BlobStore, BlockId, ByteStream, ListingPage, ObjectRef, ResourceKind};
use crate::constants::DEFAULT_WRITE_BUFFER_SIZE;
use crate::error::{Result, TransferError};
use crate::name_mapper::remote_key_to_local_path;

const STAGING_DIR: &str = ".staging";

/// Blob store over a local directory tree.
#[derive(Debug, Clone)]
pub struct FileSystemBlobStore {
    root: PathBuf,
}

impl FileSystemBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| TransferError::local(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_path(&self, container: &str) -> Result<PathBuf> {
        validate_container_name(container)?;
        Ok(self.root.join(container))
    }

    fn object_path(&self, object: &ObjectRef) -> Result<PathBuf> {
        remote_key_to_local_path(&self.container_path(&object.container)?, &object.key)
    }

    // One directory per object key; the key is encoded so any key maps to a single
    // path segment.
    fn staging_path(&self, object: &ObjectRef) -> Result<PathBuf> {
        validate_container_name(&object.container)?;
        Ok(self
            .root
            .join(STAGING_DIR)
            .join(&object.container)
            .join(URL_SAFE_NO_PAD.encode(object.key.as_bytes())))
    }

    async fn require_container(&self, container: &str) -> Result<PathBuf> {
        let path = self.container_path(container)?;
        if !is_dir(&path).await {
            return Err(TransferError::NotFound(format!("container {container}")));
        }
        Ok(path)
    }

    /// All committed keys in `container`, sorted.
    async fn object_keys(&self, container_dir: PathBuf) -> Result<Vec<String>> {
        tokio::task::spawn_blocking(move || collect_keys(&container_dir))
            .await
            .map_err(|e| TransferError::Internal(format!("listing task failed: {e}")))?
    }

    async fn container_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await.map_err(|e| TransferError::local(&self.root, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| TransferError::local(&self.root, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await.map_err(|e| TransferError::local(entry.path(), e))?;
            if file_type.is_dir() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl BlobStore for FileSystemBlobStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn container_exists(&self, container: &str) -> Result<bool> {
        Ok(is_dir(&self.container_path(container)?).await)
    }

    async fn create_container(&self, container: &str) -> Result<()> {
        let path = self.container_path(container)?;
        fs::create_dir_all(&path).await.map_err(|e| TransferError::local(&path, e))?;
        debug!("created container {} at {}", container, path.display());
        Ok(())
    }

    async fn stage_block(&self, object: &ObjectRef, block_id: &BlockId, data: Bytes) -> Result<()> {
        self.require_container(&object.container).await?;
        let dir = self.staging_path(object)?;
        fs::create_dir_all(&dir).await.map_err(|e| TransferError::local(&dir, e))?;

        let path = dir.join(block_file_name(block_id));
        fs::write(&path, &data).await.map_err(|e| TransferError::local(&path, e))?;
        trace!("staged block {} ({} bytes) for {}", block_id, data.len(), object);
        Ok(())
    }

    async fn commit_block_list(&self, object: &ObjectRef, block_ids: &[BlockId]) -> Result<()> {
        self.require_container(&object.container).await?;
        let target = self.object_path(object)?;
        let staging = self.staging_path(object)?;
        fs::create_dir_all(&staging).await.map_err(|e| TransferError::local(&staging, e))?;

        let temp = staging.with_extension(format!("commit-{}", Uuid::new_v4()));
        if let Err(e) = assemble(&staging, block_ids, &temp).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| TransferError::local(parent, e))?;
        }
        fs::rename(&temp, &target).await.map_err(|e| TransferError::local(&target, e))?;

        // Uncommitted leftovers are discarded with the staging directory.
        if let Err(e) = fs::remove_dir_all(&staging).await {
            debug!("could not clear staging area {}: {}", staging.display(), e);
        }
        debug!("committed {} from {} blocks", object, block_ids.len());
        Ok(())
    }

    async fn list_page(
        &self,
        kind: &ResourceKind,
        prefix: &str,
        cursor: &str,
        page_size: usize,
    ) -> Result<ListingPage> {
        let names = match kind {
            ResourceKind::Objects { container } => {
                let dir = self.require_container(container).await?;
                self.object_keys(dir).await?
            }
            ResourceKind::Containers => self.container_names().await?,
        };
        Ok(page_after(names, prefix, cursor, page_size))
    }

    async fn open_read(&self, object: &ObjectRef) -> Result<ByteStream> {
        self.require_container(&object.container).await?;
        let path = self.object_path(object)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::NotFound(format!("object {object}")));
            }
            Err(e) => return Err(TransferError::local(&path, e)),
        };
        let stream = ReaderStream::with_capacity(file, DEFAULT_WRITE_BUFFER_SIZE)
            .map(move |chunk| chunk.map_err(|e| TransferError::local(&path, e)));
        Ok(Box::pin(stream))
    }

    async fn delete(&self, object: &ObjectRef) -> Result<()> {
        let container_dir = self.require_container(&object.container).await?;
        let path = self.object_path(object)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::NotFound(format!("object {object}")));
            }
            Err(e) => return Err(TransferError::local(&path, e)),
        }

        // Prune directories the key left empty, stopping at the container.
        let mut dir = path.parent().map(Path::to_path_buf);
        while let Some(d) = dir {
            if d == container_dir || fs::remove_dir(&d).await.is_err() {
                break;
            }
            dir = d.parent().map(Path::to_path_buf);
        }
        debug!("deleted {}", object);
        Ok(())
    }
}

fn validate_container_name(container: &str) -> Result<()> {
    if container.is_empty() || container.starts_with('.') || container.contains(|c: char| c == '/' || c == '\\') {
        return Err(TransferError::Validation(format!("invalid container name {container:?}")));
    }
    Ok(())
}

fn block_file_name(block_id: &BlockId) -> String {
    URL_SAFE_NO_PAD.encode(block_id.raw().as_bytes())
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

/// Concatenate the staged blocks named by `block_ids`, in order, into `dest`.
async fn assemble(staging: &Path, block_ids: &[BlockId], dest: &Path) -> Result<()> {
    let mut out = fs::File::create(dest).await.map_err(|e| TransferError::local(dest, e))?;
    for id in block_ids {
        let block_path = staging.join(block_file_name(id));
        let data = match fs::read(&block_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::NotFound(format!("staged block {id}")));
            }
            Err(e) => return Err(TransferError::local(&block_path, e)),
        };
        out.write_all(&data).await.map_err(|e| TransferError::local(dest, e))?;
    }
    out.flush().await.map_err(|e| TransferError::local(dest, e))?;
    out.sync_all().await.map_err(|e| TransferError::local(dest, e))?;
    Ok(())
}

fn collect_keys(container_dir: &Path) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    for entry in WalkDir::new(container_dir).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| container_dir.to_path_buf());
            match e.into_io_error() {
                Some(io) => TransferError::local(path, io),
                None => TransferError::Internal("filesystem loop in container".into()),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(container_dir) else {
            continue;
        };
        let key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        keys.push(key);
    }
    keys.sort();
    Ok(keys)
}

/// Slice a sorted name list into one page. The cursor is the last name of the
/// previous page.
fn page_after(names: Vec<String>, prefix: &str, cursor: &str, page_size: usize) -> ListingPage {
    let page_size = page_size.max(1);
    let mut matching = names
        .into_iter()
        .filter(|n| n.starts_with(prefix))
        .filter(|n| cursor.is_empty() || n.as_str() > cursor);

    let entries: Vec<String> = matching.by_ref().take(page_size).collect();
    let more = matching.next().is_some();
    match (more, entries.last()) {
        (true, Some(last)) => {
            let next = last.clone();
            ListingPage::new(entries, next)
        }
        _ => ListingPage::last(entries),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pages_follow_cursor() {
        let all = names(&["a/1", "a/2", "a/3", "b/1"]);
        let first = page_after(all.clone(), "a/", "", 2);
        assert_eq!(first.entries, names(&["a/1", "a/2"]));
        assert_eq!(first.next_cursor, "a/2");

        let second = page_after(all, "a/", &first.next_cursor, 2);
        assert_eq!(second.entries, names(&["a/3"]));
        assert!(second.is_exhausted());
    }

    #[test]
    fn exact_fit_has_no_cursor() {
        let page = page_after(names(&["x", "y"]), "", "", 2);
        assert_eq!(page.entries.len(), 2);
        assert!(page.next_cursor.is_empty());
    }

    #[test]
    fn container_names_are_checked() {
        assert!(validate_container_name("data").is_ok());
        assert!(validate_container_name("").is_err());
        assert!(validate_container_name(".staging").is_err());
        assert!(validate_container_name("a/b").is_err());
    }
}

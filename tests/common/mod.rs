// tests/common/mod.rs
//
// Shared test helpers: an in-memory recording BlobStore with scripted pagination and
// fault injection, plus small local-tree builders.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use azstore_tools::{BlobStore, BlockId, ByteStream, ListingPage, ObjectRef, ResourceKind, TransferError};

type Result<T> = std::result::Result<T, TransferError>;

/// One recorded `list_page` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCall {
    pub prefix: String,
    pub cursor: String,
    pub page_size: usize,
}

#[derive(Default)]
struct State {
    containers: BTreeMap<String, BTreeMap<String, Bytes>>,
    staged: HashMap<ObjectRef, HashMap<String, Bytes>>,
    stage_calls: Vec<(ObjectRef, BlockId)>,
    commits: Vec<(ObjectRef, Vec<BlockId>)>,
    list_calls: Vec<ListCall>,
    scripted_pages: Option<VecDeque<Result<ListingPage>>>,
}

/// BlobStore kept entirely in memory, recording every call it receives.
#[derive(Default)]
pub struct MemoryBlobStore {
    state: Mutex<State>,
    fail_stage_keys: Mutex<HashSet<String>>,
    fail_read_keys: Mutex<HashSet<String>>,
    read_piece: Mutex<Option<usize>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, container: &str) -> Self {
        self.state.lock().unwrap().containers.entry(container.to_string()).or_default();
        self
    }

    /// Serve these pages, in order, regardless of the arguments passed.
    pub fn with_pages(self, pages: Vec<Result<ListingPage>>) -> Self {
        self.state.lock().unwrap().scripted_pages = Some(pages.into_iter().collect());
        self
    }

    /// Make every `stage_block` for `key` fail.
    pub fn fail_stage_for(self, key: &str) -> Self {
        self.fail_stage_keys.lock().unwrap().insert(key.to_string());
        self
    }

    /// Make the byte stream for `key` fail after its first piece.
    pub fn fail_read_for(self, key: &str) -> Self {
        self.fail_read_keys.lock().unwrap().insert(key.to_string());
        self
    }

    /// Split read streams into pieces of `n` bytes.
    pub fn with_read_piece(self, n: usize) -> Self {
        *self.read_piece.lock().unwrap() = Some(n);
        self
    }

    pub fn put_object(&self, container: &str, key: &str, data: impl Into<Bytes>) {
        self.state
            .lock()
            .unwrap()
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    pub fn object(&self, container: &str, key: &str) -> Option<Bytes> {
        self.state.lock().unwrap().containers.get(container)?.get(key).cloned()
    }

    pub fn keys(&self, container: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(container)
            .map(|objs| objs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stage_calls(&self) -> Vec<(ObjectRef, BlockId)> {
        self.state.lock().unwrap().stage_calls.clone()
    }

    pub fn commits(&self) -> Vec<(ObjectRef, Vec<BlockId>)> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn list_calls(&self) -> Vec<ListCall> {
        self.state.lock().unwrap().list_calls.clone()
    }
}

fn injected(op: &'static str, what: &str) -> TransferError {
    TransferError::io(op, format!("injected failure for {what}"))
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn container_exists(&self, container: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().containers.contains_key(container))
    }

    async fn create_container(&self, container: &str) -> Result<()> {
        self.state.lock().unwrap().containers.entry(container.to_string()).or_default();
        Ok(())
    }

    async fn stage_block(&self, object: &ObjectRef, block_id: &BlockId, data: Bytes) -> Result<()> {
        if self.fail_stage_keys.lock().unwrap().contains(&object.key) {
            return Err(injected("stage block", &object.key));
        }
        let mut state = self.state.lock().unwrap();
        state.stage_calls.push((object.clone(), block_id.clone()));
        state.staged.entry(object.clone()).or_default().insert(block_id.raw().to_string(), data);
        Ok(())
    }

    async fn commit_block_list(&self, object: &ObjectRef, block_ids: &[BlockId]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let staged = state.staged.remove(object).unwrap_or_default();
        let mut body = Vec::new();
        for id in block_ids {
            let block = staged
                .get(id.raw())
                .ok_or_else(|| TransferError::NotFound(format!("staged block {id}")))?;
            body.extend_from_slice(block);
        }
        state.commits.push((object.clone(), block_ids.to_vec()));
        state
            .containers
            .entry(object.container.clone())
            .or_default()
            .insert(object.key.clone(), Bytes::from(body));
        Ok(())
    }

    async fn list_page(
        &self,
        kind: &ResourceKind,
        prefix: &str,
        cursor: &str,
        page_size: usize,
    ) -> Result<ListingPage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls.push(ListCall {
            prefix: prefix.to_string(),
            cursor: cursor.to_string(),
            page_size,
        });

        if let Some(pages) = state.scripted_pages.as_mut() {
            return pages.pop_front().unwrap_or_else(|| Ok(ListingPage::default()));
        }

        let names: Vec<String> = match kind {
            ResourceKind::Objects { container } => state
                .containers
                .get(container)
                .ok_or_else(|| TransferError::NotFound(format!("container {container}")))?
                .keys()
                .cloned()
                .collect(),
            ResourceKind::Containers => state.containers.keys().cloned().collect(),
        };
        let mut matching = names
            .into_iter()
            .filter(|n| n.starts_with(prefix))
            .filter(|n| cursor.is_empty() || n.as_str() > cursor);
        let entries: Vec<String> = matching.by_ref().take(page_size.max(1)).collect();
        let next = if matching.next().is_some() { entries.last().cloned().unwrap_or_default() } else { String::new() };
        Ok(ListingPage::new(entries, next))
    }

    async fn open_read(&self, object: &ObjectRef) -> Result<ByteStream> {
        let data = self
            .object(&object.container, &object.key)
            .ok_or_else(|| TransferError::NotFound(format!("object {object}")))?;
        let piece = self.read_piece.lock().unwrap().unwrap_or(data.len().max(1));
        let fail = self.fail_read_keys.lock().unwrap().contains(&object.key);

        let mut items: Vec<Result<Bytes>> = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + piece).min(data.len());
            items.push(Ok(data.slice(offset..end)));
            offset = end;
            if fail {
                items.push(Err(injected("get", &object.key)));
                break;
            }
        }
        if fail && items.is_empty() {
            items.push(Err(injected("get", &object.key)));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn delete(&self, object: &ObjectRef) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .containers
            .get_mut(&object.container)
            .and_then(|objs| objs.remove(&object.key))
            .map(|_| ())
            .ok_or_else(|| TransferError::NotFound(format!("object {object}")))
    }
}

/// Deterministic content where every byte depends on its offset.
pub fn patterned_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Write `files` (relative path, contents) under `root`, creating directories.
pub fn write_tree(root: &Path, files: &[(&str, Vec<u8>)]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(rel, data)| {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, data).unwrap();
            path
        })
        .collect()
}

// src/blob_store.rs
//
// Pluggable blob-store abstraction used by the transfer engine.
// Backends: Azure Blob Storage (feature "azure") and a local directory emulation.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use futures::Stream;
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::error::{Result, TransferError};
use crate::file_store::FileSystemBlobStore;

/// A boxed, pinned, sendable stream of object bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'static>>;

/// Remote object address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub container: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self { container: container.into(), key: key.into() }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

/// Identifier of one staged block.
///
/// Generated from a random v4 UUID; `raw()` is the UUID text, `encoded()` its base64
/// form, which is what travels in request headers and block lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockId {
    raw: String,
    encoded: String,
}

impl BlockId {
    pub fn generate() -> Self {
        Self::from_raw(Uuid::new_v4().to_string())
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let encoded = B64.encode(raw.as_bytes());
        Self { raw, encoded }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// What a listing call enumerates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// Objects inside one container.
    Objects { container: String },
    /// Containers in the account.
    Containers,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Objects { container } => write!(f, "objects in {container}"),
            ResourceKind::Containers => f.write_str("containers"),
        }
    }
}

/// One batch of listing results plus the cursor for the next call.
/// An empty `next_cursor` means there are no further pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub entries: Vec<String>,
    pub next_cursor: String,
}

impl ListingPage {
    pub fn new(entries: Vec<String>, next_cursor: impl Into<String>) -> Self {
        Self { entries, next_cursor: next_cursor.into() }
    }

    /// Final page: no continuation.
    pub fn last(entries: Vec<String>) -> Self {
        Self { entries, next_cursor: String::new() }
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_cursor.is_empty() || self.entries.is_empty()
    }
}

/// Blob-store operations the transfer engine relies on.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    async fn container_exists(&self, container: &str) -> Result<bool>;

    /// Create a container; succeeds if it already exists.
    async fn create_container(&self, container: &str) -> Result<()>;

    /// Stage `data` under `block_id` for `object`. Not visible until committed.
    async fn stage_block(&self, object: &ObjectRef, block_id: &BlockId, data: Bytes) -> Result<()>;

    /// Finalize `object` from `block_ids`, in order, each taken at its latest staged
    /// version. An empty list yields a zero-byte object.
    async fn commit_block_list(&self, object: &ObjectRef, block_ids: &[BlockId]) -> Result<()>;

    /// Fetch one page of names. `cursor` is empty on the first call.
    async fn list_page(
        &self,
        kind: &ResourceKind,
        prefix: &str,
        cursor: &str,
        page_size: usize,
    ) -> Result<ListingPage>;

    /// Open a byte stream over a committed object.
    async fn open_read(&self, object: &ObjectRef) -> Result<ByteStream>;

    async fn delete(&self, object: &ObjectRef) -> Result<()>;

    /// Shared-access-signature URL for one object.
    async fn object_sas_url(&self, object: &ObjectRef, _ttl: Duration, _permissions: &str) -> Result<String> {
        Err(TransferError::Unsupported(format!(
            "{} backend cannot sign SAS URLs (requested for {object})",
            self.name()
        )))
    }

    /// Shared-access-signature URL for a whole container.
    async fn container_sas_url(&self, container: &str, _ttl: Duration, _permissions: &str) -> Result<String> {
        Err(TransferError::Unsupported(format!(
            "{} backend cannot sign SAS URLs (requested for container {container})",
            self.name()
        )))
    }
}

/// Build the blob store selected by `backend`.
pub async fn store_for_config(backend: &BackendConfig) -> Result<Arc<dyn BlobStore>> {
    match backend {
        BackendConfig::Local { root } => Ok(Arc::new(FileSystemBlobStore::new(root)?)),
        #[cfg(feature = "azure")]
        BackendConfig::Azure { account, endpoint } => {
            let store = match endpoint {
                Some(url) => crate::azure_client::AzureBlobStore::with_default_credential_from_url(url)?,
                None => crate::azure_client::AzureBlobStore::with_default_credential(account)?,
            };
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "azure"))]
        BackendConfig::Azure { .. } => Err(TransferError::Unsupported(
            "built without the `azure` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_ids_are_unique_and_fixed_width() {
        let a = BlockId::generate();
        let b = BlockId::generate();
        assert_ne!(a, b);
        assert_eq!(a.encoded().len(), b.encoded().len());
        assert_eq!(B64.decode(a.encoded()).unwrap(), a.raw().as_bytes());
    }

    #[test]
    fn listing_page_exhaustion() {
        assert!(ListingPage::last(vec!["a".into()]).is_exhausted());
        assert!(ListingPage::new(vec![], "more").is_exhausted());
        assert!(!ListingPage::new(vec!["a".into()], "more").is_exhausted());
    }
}

// src/azure_client.rs
//
// Azure Blob Storage backend for the transfer engine.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, trace};

use azure_core::credentials::TokenCredential;
use azure_core::http::{Body, NoFormat, RequestContent, StatusCode, XmlFormat};
use azure_identity::DefaultAzureCredential;

use azure_storage_blob::clients::{
    BlobClient, BlobClientOptions, BlobContainerClient, BlobContainerClientOptions, BlobServiceClient,
    BlobServiceClientOptions, BlockBlobClient,
};
use azure_storage_blob::models::{
    BlobClientDownloadOptions, BlobContainerClientListBlobFlatSegmentOptions,
    BlobServiceClientListContainersSegmentOptions, BlockBlobClientCommitBlockListOptions,
    BlockBlobClientStageBlockOptions, BlockLookupList, ListBlobsFlatSegmentResponse,
    ListContainersSegmentResponse,
};

use crate::blob_store::{BlobStore, BlockId, ByteStream, ListingPage, ObjectRef, ResourceKind};
use crate::error::{Result, TransferError};

fn is_status(err: &azure_core::Error, status: StatusCode) -> bool {
    err.http_status() == Some(status)
}

/// Client for one storage account.
#[derive(Clone)]
pub struct AzureBlobStore {
    account_url: String, // e.g. https://{account}.blob.core.windows.net
    credential: Arc<dyn TokenCredential>,
}

impl AzureBlobStore {
    /// Public Azure endpoint for an account name.
    pub fn account_url_from_account(account: &str) -> String {
        format!("https://{}.blob.core.windows.net", account)
    }

    /// Azurite helper, e.g. http://127.0.0.1:10000/{account}
    pub fn azurite_url(host: &str, port: u16, account: &str) -> String {
        format!("http://{}:{}/{}", host, port, account)
    }

    /// Build with the Entra ID default chain (env, managed identity, CLI login).
    pub fn with_default_credential(account: &str) -> Result<Self> {
        if account.is_empty() {
            return Err(TransferError::Validation("storage account name is empty".into()));
        }
        Self::with_default_credential_from_url(&Self::account_url_from_account(account))
    }

    /// Same, when a full endpoint URL (possibly an emulator) is provided.
    pub fn with_default_credential_from_url(account_url: &str) -> Result<Self> {
        let credential: Arc<dyn TokenCredential> =
            DefaultAzureCredential::new().map_err(|e| TransferError::io("credential", e))?;
        Ok(Self { account_url: account_url.trim_end_matches('/').to_string(), credential })
    }

    pub fn account_url(&self) -> &str {
        &self.account_url
    }

    fn service_client(&self) -> Result<BlobServiceClient> {
        BlobServiceClient::new(&self.account_url, self.credential.clone(), Some(BlobServiceClientOptions::default()))
            .map_err(|e| TransferError::io("client", e))
    }

    fn container_client(&self, container: &str) -> Result<BlobContainerClient> {
        BlobContainerClient::new(
            &self.account_url,
            container.to_string(),
            self.credential.clone(),
            Some(BlobContainerClientOptions::default()),
        )
        .map_err(|e| TransferError::io("client", e))
    }

    fn blob_client(&self, object: &ObjectRef) -> Result<BlobClient> {
        BlobClient::new(
            &self.account_url,
            object.container.clone(),
            object.key.clone(),
            self.credential.clone(),
            Some(BlobClientOptions::default()),
        )
        .map_err(|e| TransferError::io("client", e))
    }

    fn block_blob_client(&self, object: &ObjectRef) -> Result<BlockBlobClient> {
        Ok(self.blob_client(object)?.block_blob_client())
    }

    async fn list_blobs_page(&self, container: &str, prefix: &str, cursor: &str, page_size: usize) -> Result<ListingPage> {
        let client = self.container_client(container)?;
        let mut opts = BlobContainerClientListBlobFlatSegmentOptions::default();
        if !prefix.is_empty() {
            opts.prefix = Some(prefix.to_string());
        }
        if !cursor.is_empty() {
            opts.marker = Some(cursor.to_string());
        }
        opts.maxresults = Some(page_size as i32);

        // One request per call; the lister owns continuation.
        let mut pager = client.list_blobs(Some(opts)).map_err(|e| TransferError::io("list", e))?;
        let Some(first) = pager.next().await else {
            return Ok(ListingPage::default());
        };
        let resp = first.map_err(|e| {
            if is_status(&e, StatusCode::NotFound) {
                TransferError::NotFound(format!("container {container}"))
            } else {
                TransferError::io("list", e)
            }
        })?;
        let body: ListBlobsFlatSegmentResponse = resp.into_body().await.map_err(|e| TransferError::io("list", e))?;

        let entries = body
            .segment
            .blob_items
            .into_iter()
            .filter_map(|it| it.name.and_then(|bn| bn.content))
            .collect();
        Ok(ListingPage::new(entries, body.next_marker.unwrap_or_default()))
    }

    async fn list_containers_page(&self, prefix: &str, cursor: &str, page_size: usize) -> Result<ListingPage> {
        let client = self.service_client()?;
        let mut opts = BlobServiceClientListContainersSegmentOptions::default();
        if !prefix.is_empty() {
            opts.prefix = Some(prefix.to_string());
        }
        if !cursor.is_empty() {
            opts.marker = Some(cursor.to_string());
        }
        opts.maxresults = Some(page_size as i32);

        let mut pager = client.list_containers(Some(opts)).map_err(|e| TransferError::io("list", e))?;
        let Some(first) = pager.next().await else {
            return Ok(ListingPage::default());
        };
        let resp = first.map_err(|e| TransferError::io("list", e))?;
        let body: ListContainersSegmentResponse = resp.into_body().await.map_err(|e| TransferError::io("list", e))?;

        let entries = body.container_items.into_iter().filter_map(|c| c.name).collect();
        Ok(ListingPage::new(entries, body.next_marker.unwrap_or_default()))
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn container_exists(&self, container: &str) -> Result<bool> {
        let client = self.container_client(container)?;
        match client.get_properties(None).await {
            Ok(_) => Ok(true),
            Err(e) if is_status(&e, StatusCode::NotFound) => Ok(false),
            Err(e) => Err(TransferError::io("container properties", e)),
        }
    }

    async fn create_container(&self, container: &str) -> Result<()> {
        let client = self.container_client(container)?;
        match client.create_container(None).await {
            Ok(_) => {
                debug!("created container {}", container);
                Ok(())
            }
            Err(e) if is_status(&e, StatusCode::Conflict) => {
                debug!("container {} already exists", container);
                Ok(())
            }
            Err(e) => Err(TransferError::io("create container", e)),
        }
    }

    /// The raw id bytes are passed through; the SDK base64-encodes them on the wire.
    async fn stage_block(&self, object: &ObjectRef, block_id: &BlockId, data: Bytes) -> Result<()> {
        let bb = self.block_blob_client(object)?;
        let content_len = data.len() as u64;
        let body: RequestContent<Bytes, NoFormat> = Body::from(data).into();
        bb.stage_block(
            block_id.raw().as_bytes(),
            content_len,
            body,
            Some(BlockBlobClientStageBlockOptions::default()),
        )
        .await
        .map_err(|e| TransferError::io("stage block", e))?;
        trace!("staged block {} ({} bytes) for {}", block_id, content_len, object);
        Ok(())
    }

    async fn commit_block_list(&self, object: &ObjectRef, block_ids: &[BlockId]) -> Result<()> {
        let bb = self.block_blob_client(object)?;
        let lookup = BlockLookupList {
            committed: None,
            latest: Some(block_ids.iter().map(|id| id.raw().as_bytes().to_vec()).collect()),
            uncommitted: None,
        };
        let body: RequestContent<BlockLookupList, XmlFormat> =
            lookup.try_into().map_err(|e| TransferError::io("commit block list", e))?;
        bb.commit_block_list(body, Some(BlockBlobClientCommitBlockListOptions::default()))
            .await
            .map_err(|e| TransferError::io("commit block list", e))?;
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
        match kind {
            ResourceKind::Objects { container } => self.list_blobs_page(container, prefix, cursor, page_size).await,
            ResourceKind::Containers => self.list_containers_page(prefix, cursor, page_size).await,
        }
    }

    async fn open_read(&self, object: &ObjectRef) -> Result<ByteStream> {
        let blob = self.blob_client(object)?;
        let resp = blob
            .download(Some(BlobClientDownloadOptions::default()))
            .await
            .map_err(|e| {
                if is_status(&e, StatusCode::NotFound) {
                    TransferError::NotFound(format!("object {object}"))
                } else {
                    TransferError::io("get", e)
                }
            })?;
        let stream = resp.into_raw_body().map(|chunk| chunk.map_err(|e| TransferError::io("get", e)));
        Ok(Box::pin(stream))
    }

    async fn delete(&self, object: &ObjectRef) -> Result<()> {
        let blob = self.blob_client(object)?;
        match blob.delete(None).await {
            Ok(_) => {
                debug!("deleted {}", object);
                Ok(())
            }
            Err(e) if is_status(&e, StatusCode::NotFound) => Err(TransferError::NotFound(format!("object {object}"))),
            Err(e) => Err(TransferError::io("delete", e)),
        }
    }
}

// src/lib.rs
//
// Crate root: bulk transfer engine between a local tree and a blob store, plus a
// small message-queue surface.

pub mod constants;
pub mod error;
pub mod config;
pub mod progress;

// ===== Storage backends =====
pub mod blob_store;
pub mod file_store;
pub mod queue;

#[cfg(feature = "azure")]
pub mod azure_client;

// ===== Transfer engine =====
pub mod name_mapper;
pub mod listing;
pub mod block_upload;
pub mod concurrency;
pub mod transfer;
pub mod upload;
pub mod download;

pub use blob_store::{store_for_config, BlobStore, BlockId, ByteStream, ListingPage, ObjectRef, ResourceKind};
pub use block_upload::{upload_file, ChunkedUploader, UploadReport};
pub use config::{AppConfig, BackendConfig, BackendFlags, TransferConfig};
pub use download::{download_batch, DownloadCoordinator};
pub use error::{Result, TransferError};
pub use file_store::FileSystemBlobStore;
pub use listing::{list_containers, list_objects, PaginatedLister};
pub use name_mapper::{local_to_remote_key, remote_key_to_local_path, NameMapper};
pub use queue::{queue_store_for_config, AzureQueueStore, FileSystemQueueStore, PushOptions, QueueStore};
pub use transfer::{BatchSummary, FailedTransfer, TransferDirection, TransferTask};
pub use upload::{upload_batch, UploadCoordinator};

#[cfg(feature = "azure")]
pub use azure_client::AzureBlobStore;

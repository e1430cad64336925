// src/error.rs
//
// Error taxonomy shared by every transfer, listing and queue operation.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, TransferError>;

/// Boxed source error carried by backend failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the transfer engine and its backends.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Local path, container, object or queue does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network or API failure while talking to the storage service.
    #[error("{op} failed: {source}")]
    TransferIo {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    /// Reading or writing a local file failed.
    #[error("local I/O error on {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed configuration or argument.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// The selected backend does not provide this operation.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// The run was cancelled before this work finished.
    #[error("transfer cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// Wrap a backend failure for operation `op`.
    pub fn io(op: &'static str, source: impl Into<BoxError>) -> Self {
        TransferError::TransferIo { op, source: source.into() }
    }

    /// Wrap a local filesystem failure on `path`.
    pub fn local(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        TransferError::LocalIo { path: path.as_ref().to_path_buf(), source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TransferError::NotFound(_))
    }
}

// src/config.rs
//
// Typed runtime configuration, built once at startup and passed into the core calls.

use std::path::PathBuf;

use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_PAGE_SIZE, DEFAULT_QUEUE_CAPACITY,
    ENV_ACCOUNT_NAME, ENV_BLOB_ENDPOINT, ENV_LOCAL_STORE, MAX_CONCURRENCY,
};
use crate::error::{Result, TransferError};

/// Which storage service the run talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Azure Storage account, optionally at an explicit endpoint URL.
    Azure { account: String, endpoint: Option<String> },
    /// Directory-backed emulation rooted at `root`.
    Local { root: PathBuf },
}

/// Knobs for the transfer engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Number of concurrent workers (1..=1000).
    pub concurrency: usize,
    /// Block size in bytes for uploads.
    pub chunk_size: usize,
    /// Entries per listing request.
    pub page_size: usize,
    /// Capacity of the bounded work queue.
    pub queue_capacity: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl TransferConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(TransferError::Validation(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        if self.chunk_size == 0 {
            return Err(TransferError::Validation("chunk size must be at least 1 byte".into()));
        }
        if self.page_size == 0 {
            return Err(TransferError::Validation("page size must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(TransferError::Validation("queue capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Everything a command needs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub transfer: TransferConfig,
}

/// Backend-selection settings as given on the command line; `None` means "not passed".
#[derive(Debug, Clone, Default)]
pub struct BackendFlags {
    pub account_name: Option<String>,
    pub endpoint: Option<String>,
    pub local_store: Option<PathBuf>,
}

/// Flag value if present and non-empty, else the environment value.
pub fn resolve_setting<F>(flag: Option<&str>, env_key: &str, env_lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    flag.filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| env_lookup(env_key).filter(|v| !v.is_empty()))
}

impl BackendConfig {
    /// Resolve from flags, falling back to the process environment.
    pub fn from_flags(flags: &BackendFlags) -> Result<Self> {
        Self::resolve(flags, &|key: &str| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup. A local store wins over Azure
    /// settings; otherwise an account name is required.
    pub fn resolve<F>(flags: &BackendFlags, env_lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let local_flag = flags.local_store.as_ref().map(|p| p.to_string_lossy().into_owned());
        if let Some(root) = resolve_setting(local_flag.as_deref(), ENV_LOCAL_STORE, env_lookup) {
            return Ok(BackendConfig::Local { root: PathBuf::from(root) });
        }

        let endpoint = resolve_setting(flags.endpoint.as_deref(), ENV_BLOB_ENDPOINT, env_lookup);
        let account = resolve_setting(flags.account_name.as_deref(), ENV_ACCOUNT_NAME, env_lookup);
        match (account, endpoint) {
            (Some(account), endpoint) => Ok(BackendConfig::Azure { account, endpoint }),
            // An endpoint URL already names the account.
            (None, Some(endpoint)) => Ok(BackendConfig::Azure { account: String::new(), endpoint: Some(endpoint) }),
            (None, None) => Err(TransferError::Validation(format!(
                "no storage account configured: pass --account-name or set {ENV_ACCOUNT_NAME} \
                 (or use --local-store / {ENV_LOCAL_STORE})"
            ))),
        }
    }
}

// src/queue.rs
//
// Message queue backends: push, pop, peek, clear and size on a named queue.
//
// The directory-backed store keeps one file per message. File names carry the time a
// message becomes visible and the time it expires, so a sorted directory listing is
// also the delivery order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::constants::DEFAULT_MESSAGE_TTL_SECS;
use crate::error::{Result, TransferError};

/// Per-message options for [`QueueStore::push`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// How long the message lives; `None` uses the 7 day service default.
    pub ttl: Option<Duration>,
    /// How long the message stays hidden after the push.
    pub visibility_delay: Option<Duration>,
}

impl PushOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_visibility_delay(mut self, delay: Duration) -> Self {
        self.visibility_delay = Some(delay);
        self
    }
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create a queue; succeeds if it already exists.
    async fn create_queue(&self, queue: &str) -> Result<()>;

    async fn queue_exists(&self, queue: &str) -> Result<bool>;

    /// Append a message. Fails with `NotFound` if the queue does not exist.
    async fn push(&self, queue: &str, message: &str, options: PushOptions) -> Result<()>;

    /// Remove and return the first visible message, if any.
    async fn pop(&self, queue: &str) -> Result<Option<String>>;

    /// Return the first visible message without removing it.
    async fn peek(&self, queue: &str) -> Result<Option<String>>;

    /// Remove every message.
    async fn clear(&self, queue: &str) -> Result<()>;

    /// Number of live messages, visible or not.
    async fn size(&self, queue: &str) -> Result<usize>;

    /// Shared-access-signature URL for a queue.
    async fn sas_url(&self, queue: &str, _ttl: Duration, _permissions: &str) -> Result<String> {
        Err(TransferError::Unsupported(format!(
            "{} backend cannot sign SAS URLs (requested for queue {queue})",
            self.name()
        )))
    }
}

/// Build the queue store selected by `backend`.
pub fn queue_store_for_config(backend: &BackendConfig) -> Result<Arc<dyn QueueStore>> {
    match backend {
        BackendConfig::Local { root } => Ok(Arc::new(FileSystemQueueStore::new(root)?)),
        BackendConfig::Azure { account, .. } => Ok(Arc::new(AzureQueueStore::new(account.clone()))),
    }
}

const QUEUES_DIR: &str = ".queues";
const MESSAGE_EXT: &str = "msg";

/// Queue store over a local directory.
#[derive(Debug, Clone)]
pub struct FileSystemQueueStore {
    root: PathBuf,
}

/// Name-encoded metadata of one stored message.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MessageEntry {
    path: PathBuf,
    visible_at: u128,
    expires_at: u128,
}

impl MessageEntry {
    fn file_name(visible_at: u128, expires_at: u128) -> String {
        format!("{:020}-{:020}-{}.{}", visible_at, expires_at, Uuid::new_v4(), MESSAGE_EXT)
    }

    fn parse(path: PathBuf) -> Option<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some(MESSAGE_EXT) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let mut parts = stem.splitn(3, '-');
        let visible_at = parts.next()?.parse().ok()?;
        let expires_at = parts.next()?.parse().ok()?;
        parts.next()?;
        Some(Self { path, visible_at, expires_at })
    }
}

fn now_nanos() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0)
}

fn validate_queue_name(queue: &str) -> Result<()> {
    if queue.is_empty() || queue.starts_with('.') || queue.contains(|c: char| c == '/' || c == '\\') {
        return Err(TransferError::Validation(format!("invalid queue name {queue:?}")));
    }
    Ok(())
}

impl FileSystemQueueStore {
    /// Queues live under `<root>/.queues`, next to any blob containers.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().join(QUEUES_DIR);
        std::fs::create_dir_all(&root).map_err(|e| TransferError::local(&root, e))?;
        Ok(Self { root })
    }

    fn queue_path(&self, queue: &str) -> Result<PathBuf> {
        validate_queue_name(queue)?;
        Ok(self.root.join(queue))
    }

    async fn require_queue(&self, queue: &str) -> Result<PathBuf> {
        let path = self.queue_path(queue)?;
        match fs::metadata(&path).await {
            Ok(m) if m.is_dir() => Ok(path),
            _ => Err(TransferError::NotFound(format!("queue {queue}"))),
        }
    }

    /// Live messages in delivery order. Expired messages are deleted on the way.
    async fn live_messages(&self, dir: &Path) -> Result<Vec<MessageEntry>> {
        let now = now_nanos();
        let mut live = Vec::new();
        let mut entries = fs::read_dir(dir).await.map_err(|e| TransferError::local(dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| TransferError::local(dir, e))? {
            let Some(msg) = MessageEntry::parse(entry.path()) else {
                continue;
            };
            if msg.expires_at <= now {
                trace!("dropping expired message {}", msg.path.display());
                let _ = fs::remove_file(&msg.path).await;
                continue;
            }
            live.push(msg);
        }
        live.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(live)
    }

    async fn visible_messages(&self, dir: &Path) -> Result<Vec<MessageEntry>> {
        let now = now_nanos();
        Ok(self.live_messages(dir).await?.into_iter().filter(|m| m.visible_at <= now).collect())
    }
}

#[async_trait]
impl QueueStore for FileSystemQueueStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn create_queue(&self, queue: &str) -> Result<()> {
        let path = self.queue_path(queue)?;
        fs::create_dir_all(&path).await.map_err(|e| TransferError::local(&path, e))?;
        debug!("created queue {}", queue);
        Ok(())
    }

    async fn queue_exists(&self, queue: &str) -> Result<bool> {
        let path = self.queue_path(queue)?;
        Ok(fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false))
    }

    async fn push(&self, queue: &str, message: &str, options: PushOptions) -> Result<()> {
        let dir = self.require_queue(queue).await?;
        let ttl = options.ttl.unwrap_or(Duration::from_secs(DEFAULT_MESSAGE_TTL_SECS));
        if ttl.is_zero() {
            return Err(TransferError::Validation("message ttl must be positive".into()));
        }
        let now = now_nanos();
        let visible_at = now + options.visibility_delay.unwrap_or_default().as_nanos();
        let expires_at = now + ttl.as_nanos();

        let name = MessageEntry::file_name(visible_at, expires_at);
        let temp = dir.join(format!("{name}.tmp"));
        let path = dir.join(&name);
        fs::write(&temp, message.as_bytes()).await.map_err(|e| TransferError::local(&temp, e))?;
        fs::rename(&temp, &path).await.map_err(|e| TransferError::local(&path, e))?;
        debug!("pushed {} bytes to queue {}", message.len(), queue);
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>> {
        let dir = self.require_queue(queue).await?;
        for msg in self.visible_messages(&dir).await? {
            // Claiming by rename means only one consumer gets each message.
            let claimed = msg.path.with_extension("claimed");
            match fs::rename(&msg.path, &claimed).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(TransferError::local(&msg.path, e)),
            }
            let body = fs::read(&claimed).await.map_err(|e| TransferError::local(&claimed, e))?;
            fs::remove_file(&claimed).await.map_err(|e| TransferError::local(&claimed, e))?;
            return Ok(Some(String::from_utf8_lossy(&body).into_owned()));
        }
        Ok(None)
    }

    async fn peek(&self, queue: &str) -> Result<Option<String>> {
        let dir = self.require_queue(queue).await?;
        for msg in self.visible_messages(&dir).await? {
            match fs::read(&msg.path).await {
                Ok(body) => return Ok(Some(String::from_utf8_lossy(&body).into_owned())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(TransferError::local(&msg.path, e)),
            }
        }
        Ok(None)
    }

    async fn clear(&self, queue: &str) -> Result<()> {
        let dir = self.require_queue(queue).await?;
        let mut removed = 0usize;
        for msg in self.live_messages(&dir).await? {
            match fs::remove_file(&msg.path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(TransferError::local(&msg.path, e)),
            }
        }
        debug!("cleared {} messages from queue {}", removed, queue);
        Ok(())
    }

    async fn size(&self, queue: &str) -> Result<usize> {
        let dir = self.require_queue(queue).await?;
        Ok(self.live_messages(&dir).await?.len())
    }
}

/// Azure Storage queues. The Azure SDK release this crate builds against ships no
/// queue client, so every call fails with `Unsupported`.
#[derive(Debug, Clone)]
pub struct AzureQueueStore {
    account: String,
}

impl AzureQueueStore {
    pub fn new(account: impl Into<String>) -> Self {
        Self { account: account.into() }
    }

    fn unsupported<T>(&self, op: &str, queue: &str) -> Result<T> {
        Err(TransferError::Unsupported(format!(
            "azure queue {op} on {}/{queue} (no queue client available; use --local-store)",
            self.account
        )))
    }
}

#[async_trait]
impl QueueStore for AzureQueueStore {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn create_queue(&self, queue: &str) -> Result<()> {
        self.unsupported("create", queue)
    }

    async fn queue_exists(&self, queue: &str) -> Result<bool> {
        self.unsupported("exists", queue)
    }

    async fn push(&self, queue: &str, _message: &str, _options: PushOptions) -> Result<()> {
        self.unsupported("push", queue)
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>> {
        self.unsupported("pop", queue)
    }

    async fn peek(&self, queue: &str) -> Result<Option<String>> {
        self.unsupported("peek", queue)
    }

    async fn clear(&self, queue: &str) -> Result<()> {
        self.unsupported("clear", queue)
    }

    async fn size(&self, queue: &str) -> Result<usize> {
        self.unsupported("size", queue)
    }
}

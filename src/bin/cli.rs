// src/bin/cli.rs
//
//! `azst`: bulk transfer between a local tree and Azure Blob Storage (or a local
//! directory standing in for it), plus simple queue operations.
//!
//! Examples:
//! ```bash
//! azst --account-name acct upload ./data my-container -j 32
//! azst --account-name acct download my-container ./restore --prefix 2024/
//! azst --account-name acct ls my-container --prefix logs/ -p '\.json$'
//! azst --local-store /srv/blobs create-container scratch
//! azst --local-store /srv/blobs queue push jobs "hello" --ttl 1h
//! ```

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use regex::Regex;
use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use azstore_tools::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_PAGE_SIZE, MAX_CONCURRENCY};
use azstore_tools::progress::{ProgressCallback, TransferProgressTracker};
use azstore_tools::{
    list_containers, list_objects, queue_store_for_config, store_for_config, AppConfig, BackendConfig,
    BackendFlags, BatchSummary, DownloadCoordinator, ObjectRef, PushOptions, TransferConfig,
    UploadCoordinator,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    #[command(flatten)]
    backend: BackendArgs,

    #[command(subcommand)]
    cmd: Command,
}

/// Where the data lives. Flags win over the environment.
#[derive(Args)]
struct BackendArgs {
    /// Storage account name [env: ACCOUNT_NAME]
    #[arg(long = "account-name", global = true)]
    account_name: Option<String>,

    /// Full blob endpoint URL, e.g. an Azurite emulator [env: AZURE_BLOB_ENDPOINT]
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Use a local directory instead of Azure [env: AZST_LOCAL_STORE]
    #[arg(long = "local-store", global = true)]
    local_store: Option<PathBuf>,
}

/// Engine knobs shared by upload and download.
#[derive(Args)]
struct TransferArgs {
    /// Number of concurrent transfers (1..=1000)
    #[arg(short = 'j', long = "jobs", default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency)]
    jobs: usize,

    /// Block size in bytes for uploads
    #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Entries requested per listing page
    #[arg(long = "page-size", default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Do not draw a progress bar
    #[arg(long = "no-progress")]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file or directory tree into a container.
    Upload {
        /// Local file or directory
        path: PathBuf,
        /// Destination container
        container: String,
        /// Create the container first if it is missing
        #[arg(long = "create-container")]
        create_container: bool,
        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Download every object under a prefix into a local directory.
    Download {
        /// Source container
        container: String,
        /// Destination directory
        dest_dir: PathBuf,
        /// Only objects whose name starts with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// List objects in a container.
    Ls {
        container: String,
        #[arg(long, default_value = "")]
        prefix: String,
        /// Regex applied to object names client-side
        #[arg(short = 'p', long)]
        pattern: Option<String>,
        #[arg(long = "page-size", default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },

    /// List containers in the account.
    ListContainers {
        /// Regex applied to container names client-side
        #[arg(short = 'p', long)]
        pattern: Option<String>,
        #[arg(long = "page-size", default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },

    /// Create a container (no-op if it exists).
    CreateContainer { container: String },

    /// Delete one object.
    Delete { container: String, key: String },

    /// Print a shared-access-signature URL for a container or one object.
    Sas {
        container: String,
        /// Object name; omit for a container-level URL
        key: Option<String>,
        /// Validity, e.g. "1h" or "30m"
        #[arg(long, default_value = "1h", value_parser = humantime::parse_duration)]
        expiry: Duration,
        /// Permission letters, e.g. "r" or "rwl"
        #[arg(long, default_value = "r")]
        permissions: String,
    },

    /// Message queue operations.
    Queue {
        #[command(subcommand)]
        cmd: QueueCommand,
    },
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Create a queue (no-op if it exists).
    Create { queue: String },
    /// Push one message.
    Push {
        queue: String,
        message: String,
        /// Message time-to-live, e.g. "10m"
        #[arg(long, value_parser = humantime::parse_duration)]
        ttl: Option<Duration>,
        /// Hide the message for this long after the push
        #[arg(long = "visibility-delay", value_parser = humantime::parse_duration)]
        visibility_delay: Option<Duration>,
    },
    /// Remove and print the next visible message.
    Pop { queue: String },
    /// Print the next visible message without removing it.
    Peek { queue: String },
    /// Remove every message.
    Clear { queue: String },
    /// Print the number of live messages.
    Size { queue: String },
    /// Print a shared-access-signature URL for a queue.
    Sas {
        queue: String,
        /// Validity, e.g. "1h" or "30m"
        #[arg(long, default_value = "1h", value_parser = humantime::parse_duration)]
        expiry: Duration,
        /// Permission letters, e.g. "r" or "raup"
        #[arg(long, default_value = "r")]
        permissions: String,
    },
}

fn parse_concurrency(s: &str) -> std::result::Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("{e}"))?;
    if n == 0 || n > MAX_CONCURRENCY {
        return Err(format!("must be between 1 and {MAX_CONCURRENCY}"));
    }
    Ok(n)
}

impl BackendArgs {
    fn resolve(&self) -> Result<BackendConfig> {
        let flags = BackendFlags {
            account_name: self.account_name.clone(),
            endpoint: self.endpoint.clone(),
            local_store: self.local_store.clone(),
        };
        Ok(BackendConfig::from_flags(&flags)?)
    }
}

impl TransferArgs {
    fn app_config(&self, backend: BackendConfig) -> Result<AppConfig> {
        let transfer = TransferConfig::default()
            .with_concurrency(self.jobs)
            .with_chunk_size(self.chunk_size)
            .with_page_size(self.page_size);
        transfer.validate()?;
        Ok(AppConfig { backend, transfer })
    }

    fn progress(&self, operation: &str) -> Arc<ProgressCallback> {
        let tracker = if self.no_progress {
            TransferProgressTracker::hidden()
        } else {
            TransferProgressTracker::new(operation, 0, 0)
        };
        Arc::new(ProgressCallback::new(tracker))
    }
}

/// Cancel `token` on Ctrl-C so workers stop taking new tasks.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling transfers");
            token.cancel();
        }
    });
}

fn report_summary(operation: &str, summary: &BatchSummary) -> Result<()> {
    for failure in &summary.failed {
        eprintln!("FAILED {}: {}", failure.task, failure.error);
    }
    if !summary.is_success() {
        bail!("{operation}: {summary}");
    }
    info!("{operation} finished: {summary} ({:.2} MB/s)", summary.throughput_mbps());
    Ok(())
}

fn compile_pattern(pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern
        .map(|pat| Regex::new(pat).with_context(|| format!("Invalid regex pattern: '{}'", pat)))
        .transpose()
}

fn print_names(names: &[String], pattern: Option<&str>, noun: &str) -> Result<()> {
    let re = compile_pattern(pattern)?;
    let mut shown = 0usize;
    for name in names {
        if re.as_ref().is_some_and(|re| !re.is_match(name)) {
            continue;
        }
        safe_println!("{}", name);
        shown += 1;
    }
    safe_println!("\nTotal {}: {}", noun, shown);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    // Bridge `log` records emitted by dependencies
    tracing_log::LogTracer::init().ok();

    let backend = cli.backend.resolve()?;

    match cli.cmd {
        Command::Upload { path, container, create_container, transfer } => {
            let config = transfer.app_config(backend)?;
            let store = store_for_config(&config.backend).await?;
            if create_container {
                store
                    .create_container(&container)
                    .await
                    .with_context(|| format!("creating container {container}"))?;
            }

            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let progress = transfer.progress("UPLOAD");

            let t0 = Instant::now();
            let summary = UploadCoordinator::new(store, config.transfer.clone())
                .with_cancellation(cancel)
                .with_progress(progress.clone())
                .upload_batch(&path, &container)
                .await
                .with_context(|| format!("upload of {} to {}", path.display(), container))?;
            progress.finish("Upload", t0.elapsed());
            report_summary("upload", &summary)?;
        }

        Command::Download { container, dest_dir, prefix, transfer } => {
            let config = transfer.app_config(backend)?;
            let store = store_for_config(&config.backend).await?;

            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            let progress = transfer.progress("DOWNLOAD");

            let t0 = Instant::now();
            let summary = DownloadCoordinator::new(store, config.transfer.clone())
                .with_cancellation(cancel)
                .with_progress(progress.clone())
                .download_batch(&container, &prefix, &dest_dir)
                .await
                .with_context(|| format!("download of {}/{} to {}", container, prefix, dest_dir.display()))?;
            progress.finish("Download", t0.elapsed());
            if summary.total == 0 {
                warn!("no objects in {} matched prefix {:?}", container, prefix);
            }
            report_summary("download", &summary)?;
        }

        Command::Ls { container, prefix, pattern, page_size } => {
            let store = store_for_config(&backend).await?;
            let names = list_objects(store.as_ref(), &container, &prefix, page_size).await?;
            print_names(&names, pattern.as_deref(), "objects")?;
        }

        Command::ListContainers { pattern, page_size } => {
            let store = store_for_config(&backend).await?;
            let names = list_containers(store.as_ref(), page_size).await?;
            print_names(&names, pattern.as_deref(), "containers")?;
        }

        Command::CreateContainer { container } => {
            let store = store_for_config(&backend).await?;
            store.create_container(&container).await?;
            safe_println!("Successfully created or verified container '{}'.", container);
        }

        Command::Delete { container, key } => {
            let store = store_for_config(&backend).await?;
            let object = ObjectRef::new(container, key);
            store.delete(&object).await.with_context(|| format!("deleting {object}"))?;
            safe_println!("Deleted {}", object);
        }

        Command::Sas { container, key, expiry, permissions } => {
            let store = store_for_config(&backend).await?;
            let url = match key {
                Some(key) => store.object_sas_url(&ObjectRef::new(container, key), expiry, &permissions).await?,
                None => store.container_sas_url(&container, expiry, &permissions).await?,
            };
            safe_println!("{}", url);
        }

        Command::Queue { cmd } => {
            let queues = queue_store_for_config(&backend)?;
            match cmd {
                QueueCommand::Create { queue } => {
                    queues.create_queue(&queue).await?;
                    safe_println!("Successfully created or verified queue '{}'.", queue);
                }
                QueueCommand::Push { queue, message, ttl, visibility_delay } => {
                    let options = PushOptions { ttl, visibility_delay };
                    queues.push(&queue, &message, options).await?;
                }
                QueueCommand::Pop { queue } => match queues.pop(&queue).await? {
                    Some(msg) => safe_println!("{}", msg),
                    None => info!("queue {} has no visible messages", queue),
                },
                QueueCommand::Peek { queue } => match queues.peek(&queue).await? {
                    Some(msg) => safe_println!("{}", msg),
                    None => info!("queue {} has no visible messages", queue),
                },
                QueueCommand::Clear { queue } => {
                    queues.clear(&queue).await?;
                }
                QueueCommand::Size { queue } => {
                    let n = queues.size(&queue).await?;
                    safe_println!("{}", n);
                }
                QueueCommand::Sas { queue, expiry, permissions } => {
                    let url = queues.sas_url(&queue, expiry, &permissions).await?;
                    safe_println!("{}", url);
                }
            }
        }
    }

    Ok(())
}

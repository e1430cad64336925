// src/constants.rs
//
// Centralized constants for azstore-tools to avoid hardcoded values throughout the codebase

/// Default block size used when staging file contents (100 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 100 * 1024;

/// Default number of concurrent transfer workers
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Upper bound on transfer workers, protects the remote service from accidental floods
pub const MAX_CONCURRENCY: usize = 1000;

/// Entries requested per listing page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Capacity of the bounded work queue shared by transfer workers
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Buffer used when writing a downloaded stream to disk (100 KiB)
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 100 * 1024;

/// Default time-to-live of a pushed queue message (7 days)
pub const DEFAULT_MESSAGE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

// ============================================================================
// Environment variables
// ============================================================================

/// Storage account name
pub const ENV_ACCOUNT_NAME: &str = "ACCOUNT_NAME";

/// Explicit blob endpoint (Azurite or sovereign clouds)
pub const ENV_BLOB_ENDPOINT: &str = "AZURE_BLOB_ENDPOINT";

/// Root directory of the local filesystem backend
pub const ENV_LOCAL_STORE: &str = "AZST_LOCAL_STORE";

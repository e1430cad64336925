// src/concurrency/mod.rs

pub mod work_queue;

pub use work_queue::{PoolRun, WorkerPool};

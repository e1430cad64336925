// src/concurrency/work_queue.rs
//
// Fixed-size worker pool draining a bounded, closable queue.
//
// Lifecycle of one run:
//   1. spawn `workers` tasks, all waiting on the shared receiver
//   2. enqueue every item (backpressure when the queue is full)
//   3. drop the sender, which closes the queue
//   4. join every worker; the run is complete only when all have exited
//
// Each run owns its own channel and JoinSet, so concurrent runs never share state.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_QUEUE_CAPACITY, MAX_CONCURRENCY};
use crate::error::{Result, TransferError};

/// What a finished run produced.
#[derive(Debug)]
pub struct PoolRun<O> {
    /// Handler outputs, in completion order.
    pub outputs: Vec<O>,
    /// Items that were never handed to a worker because the run was cancelled.
    pub not_started: usize,
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    queue_capacity: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Pool with `workers` executors, clamped to `1..=MAX_CONCURRENCY`.
    pub fn new(workers: usize) -> Self {
        let clamped = workers.clamp(1, MAX_CONCURRENCY);
        if clamped != workers {
            warn!("worker count {} clamped to {}", workers, clamped);
        }
        Self {
            workers: clamped,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `handler` over every item and wait for all workers to exit.
    pub async fn run<T, O, F, Fut>(&self, items: Vec<T>, handler: F) -> Result<PoolRun<O>>
    where
        T: Send + 'static,
        O: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        let total = items.len();
        let (tx, rx) = mpsc::channel::<T>(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let handler = Arc::new(handler);

        // Workers start before anything is queued.
        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers {
            let rx = Arc::clone(&rx);
            let handler = Arc::clone(&handler);
            let cancel = self.cancel.clone();
            workers.spawn(async move {
                let mut outputs = Vec::new();
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = {
                        let mut guard = rx.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            item = guard.recv() => item,
                        }
                    };
                    match next {
                        Some(item) => outputs.push(handler(item).await),
                        None => break,
                    }
                }
                debug!("worker {} exiting after {} items", worker_id, outputs.len());
                outputs
            });
        }

        let mut queued = 0usize;
        for item in items {
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                res = tx.send(item) => res.is_ok(),
            };
            if !sent {
                break;
            }
            queued += 1;
        }
        drop(tx);
        debug!("queued {} of {} items, queue closed", queued, total);

        let mut outputs = Vec::with_capacity(queued);
        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(mut worker_outputs) => outputs.append(&mut worker_outputs),
                Err(e) => failure = Some(TransferError::Internal(format!("transfer worker failed: {e}"))),
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        // Items queued but left in the channel when cancellation hit are counted too.
        let not_started = total - outputs.len();
        Ok(PoolRun { outputs, not_started })
    }
}

//! Background pre-warm pool for chunk metadata.
//!
//! Chunk-load events schedule hydration here so the first consumer access
//! finds the entry already resident. Work runs on tokio's blocking pool,
//! throttled by a semaphore so at most `threads` loads hit storage at once.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

pub struct ChunkLoader {
    runtime: Handle,
    limiter: Arc<Semaphore>,
    threads: usize,
}

impl ChunkLoader {
    /// Returns `None` when `threads` is zero, which disables pre-warming.
    pub fn new(runtime: Handle, threads: usize) -> Option<Self> {
        if threads == 0 {
            return None;
        }
        Some(Self {
            runtime,
            limiter: Arc::new(Semaphore::new(threads)),
            threads,
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Queue a blocking job. It runs once a permit is free.
    pub fn schedule<F>(&self, label: String, job: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let limiter = self.limiter.clone();
        self.runtime.spawn(async move {
            let _permit = match limiter.acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                warn!("Pre-warm task for {label} failed: {e}");
            }
        })
    }

    /// Stop accepting work. Queued jobs that have not started are dropped.
    pub fn close(&self) {
        self.limiter.close();
    }
}

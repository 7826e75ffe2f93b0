//! Bounded pool for work spawned by plugins
//!
//! A plugin may fan out inside one invocation (one probe per directory, one
//! login attempt per password). The engine joins the pool right after the
//! invocation returns, so sub-work of two plugins never overlaps.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

struct Inner {
    tasks: Mutex<JoinSet<()>>,
    permits: Arc<Semaphore>,
}

/// Cloneable handle to the scan's worker pool
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("pending", &self.pending())
            .field("available", &self.inner.permits.available_permits())
            .finish()
    }
}

impl TaskManager {
    /// Pool running at most `max_workers` tasks at once
    pub fn new(max_workers: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: Mutex::new(JoinSet::new()),
                permits: Arc::new(Semaphore::new(max_workers.max(1))),
            }),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a task; it starts once a worker slot is free
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.inner.permits);
        self.tasks().spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            future.await;
        });
    }

    /// Number of tasks not yet joined
    pub fn pending(&self) -> usize {
        self.tasks().len()
    }

    /// Wait for every queued task, including tasks spawned while waiting
    pub async fn join(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.tasks());
            if batch.is_empty() {
                return;
            }
            while let Some(result) = batch.join_next().await {
                if let Err(e) = result
                    && e.is_panic()
                {
                    warn!("A plugin worker panicked: {}", e);
                }
            }
        }
    }

    /// Abort every queued task and wait for them to finish
    pub async fn shutdown(&self) {
        let mut batch = std::mem::take(&mut *self.tasks());
        batch.abort_all();
        while batch.join_next().await.is_some() {}
    }
}

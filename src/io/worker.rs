use std::sync::Arc;

use tokio::{
    sync::Semaphore,
    task::{self, JoinHandle},
};
use tracing::{trace, Span};

use crate::error::{DbResult, Error};

/// Bounded pool of blocking workers.
///
/// Every native engine call runs on a blocking thread holding one of the
/// pool's permits, so at most `size` engine calls are in flight at once. A
/// permit is only released when the call returns.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> WorkerPool {
        let size = size.max(1);
        WorkerPool {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of workers currently idle.
    pub fn idle(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free worker and starts `f` on it. The current span is
    /// entered on the worker.
    pub async fn spawn<F, T>(&self, f: F) -> DbResult<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::WorkerPoolShutdown)?;
        let span = Span::current();

        Ok(task::spawn_blocking(move || {
            let _permit = permit;
            let _entered = span.enter();
            trace!("worker started");
            f()
        }))
    }

    /// Runs `f` on a worker and waits for its result.
    pub async fn run<F, T>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce() -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn(f)
            .await?
            .await
            .map_err(|error| Error::Worker(error.to_string()))?
    }

    /// Stops accepting work. Calls already running finish normally.
    pub fn shutdown(&self) {
        self.permits.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.permits.is_closed()
    }
}

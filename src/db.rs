use std::path::PathBuf;

use tracing::instrument;

use crate::{
    config::{Configuration, StorageTarget, DEFAULT_WORKER_THREADS},
    connection::Connection,
    error::DbResult,
    io::{
        registry::{HandleKey, Registry},
        worker::WorkerPool,
    },
};

/// A `duckbridge` instance: a connection registry plus the worker pool every
/// engine call runs on.
#[derive(Clone)]
pub struct Db {
    registry: Registry,
    pool: WorkerPool,
}

impl Default for Db {
    fn default() -> Self {
        Db::new(DEFAULT_WORKER_THREADS)
    }
}

impl Db {
    /// Creates an instance running engine calls on at most `workers` threads.
    pub fn new(workers: usize) -> Db {
        Db {
            registry: Registry::new(),
            pool: WorkerPool::new(workers),
        }
    }

    /// Opens a connection to `target`.
    ///
    /// Connections opened with the same target and an equal configuration
    /// share one database handle.
    #[instrument(skip_all, fields(%target))]
    pub async fn open(&self, target: StorageTarget, config: Configuration) -> DbResult<Connection> {
        let key = HandleKey::new(target, config);
        let registry = self.registry.clone();
        let pool = self.pool.clone();
        self.pool
            .run(move || {
                let lease = registry.acquire(&key)?;
                Ok(Connection::new(lease, key, registry, pool))
            })
            .await
    }

    pub async fn open_in_memory(&self) -> DbResult<Connection> {
        self.open(StorageTarget::InMemory, Configuration::default())
            .await
    }

    pub async fn open_file(&self, path: impl Into<PathBuf>) -> DbResult<Connection> {
        self.open(StorageTarget::File(path.into()), Configuration::default())
            .await
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Stops accepting new work. Open connections fail further queries with
    /// [`Error::WorkerPoolShutdown`](crate::error::Error::WorkerPoolShutdown).
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

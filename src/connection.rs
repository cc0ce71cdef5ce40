use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, instrument, trace, warn};

use crate::{
    config::{StorageTarget, ROW_CHANNEL_CAPACITY},
    error::{DbResult, Error, Stage},
    exec::{query, Executor, RowStream, StreamSlot},
    io::{
        registry::{ConnectionId, HandleKey, Lease, Registry},
        worker::WorkerPool,
    },
    row::Row,
    value::Value,
};

/// A logical connection.
///
/// Clones refer to the same connection. The connection is closed by
/// [`Connection::close`] or when its last clone is dropped.
#[derive(Clone)]
pub struct Connection(Arc<Inner>);

struct Inner {
    id: ConnectionId,
    key: HandleKey,
    /// Private native connection; `None` once closed. Held for the whole
    /// duration of a query.
    native: Mutex<Option<duckdb::Connection>>,
    registry: Registry,
    pool: WorkerPool,
    closed: AtomicBool,
    in_transaction: AtomicBool,
    /// Set while a [`RowStream`] of this connection is live.
    streaming: Arc<AtomicBool>,
    /// Set when a transaction was dropped between `BEGIN` and its end.
    abandoned: AtomicBool,
}

impl Inner {
    /// Runs `f` on the native connection, first rolling back a transaction
    /// whose owner went away.
    fn with_native<T>(&self, f: impl FnOnce(&duckdb::Connection) -> DbResult<T>) -> DbResult<T> {
        let native = self.native.lock();
        let native = native.as_ref().ok_or(Error::ConnectionClosed)?;
        if self.abandoned.swap(false, Ordering::AcqRel) {
            match native.execute_batch("ROLLBACK TRANSACTION") {
                Ok(()) => debug!("rolled back abandoned transaction"),
                Err(error) => debug!(%error, "abandoned transaction already ended"),
            }
        }
        f(native)
    }

    /// Closes the native connection and unregisters it. Only the first call
    /// has an effect.
    fn release(&self) {
        let native = self.native.lock().take();
        if let Some(native) = native {
            drop(native);
            self.registry.release(&self.key, self.id);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.release();
    }
}

impl Connection {
    pub(crate) fn new(lease: Lease, key: HandleKey, registry: Registry, pool: WorkerPool) -> Connection {
        Connection(Arc::new(Inner {
            id: lease.id,
            key,
            native: Mutex::new(Some(lease.native)),
            registry,
            pool,
            closed: AtomicBool::new(false),
            in_transaction: AtomicBool::new(false),
            streaming: Arc::new(AtomicBool::new(false)),
            abandoned: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> ConnectionId {
        self.0.id
    }

    pub fn target(&self) -> &StorageTarget {
        &self.0.key.target
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Acquire)
    }

    pub fn in_transaction(&self) -> bool {
        self.0.in_transaction.load(Ordering::Acquire)
    }

    /// Starts `sql` on a worker and returns its rows as an ordered stream.
    ///
    /// A connection serves one stream at a time. Until the stream is drained
    /// or dropped, other queries on this connection fail with
    /// [`Error::ConnectionBusy`].
    #[instrument(skip_all, fields(id = ?self.0.id))]
    pub async fn stream(&self, sql: &str, binds: &[Value]) -> DbResult<RowStream> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let slot = StreamSlot::claim(&self.0.streaming).ok_or(Error::ConnectionBusy)?;

        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let inner = Arc::clone(&self.0);
        let sql = sql.to_owned();
        let binds = binds.to_vec();

        let worker = self
            .0
            .pool
            .spawn(move || {
                let result = inner.with_native(|native| {
                    query::run(native, &sql, &binds, |row| {
                        tx.blocking_send(row).map_err(|_| Error::Delivery)
                    })
                });
                if let Err(Error::Delivery) = result {
                    debug!("row receiver dropped, query abandoned");
                }
                result
            })
            .await?;

        Ok(RowStream::new(rx, worker, slot))
    }

    /// Executes the given query, passing the callback closure for each yielded
    /// row.
    ///
    /// An error returned by the callback stops the query and is returned in
    /// the inner result.
    pub async fn execute<E, F>(&self, sql: &str, binds: &[Value], mut f: F) -> DbResult<Result<(), E>>
    where
        F: FnMut(Row) -> Result<(), E>,
    {
        let mut rows = self.stream(sql, binds).await?;
        while let Some(row) = rows.next_row().await? {
            if let error @ Err(_) = f(row) {
                return Ok(error);
            }
        }
        Ok(Ok(()))
    }

    /// Executes the given query and buffers every row.
    pub async fn query(&self, sql: &str, binds: &[Value]) -> DbResult<Vec<Row>> {
        self.stream(sql, binds).await?.collect_rows().await
    }

    /// Runs one or more `;`-separated statements without binds, discarding
    /// their results.
    #[instrument(skip_all, fields(id = ?self.0.id))]
    pub async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        if self.0.streaming.load(Ordering::Acquire) {
            return Err(Error::ConnectionBusy);
        }
        let inner = Arc::clone(&self.0);
        let sql = sql.to_owned();
        self.0
            .pool
            .run(move || {
                inner.with_native(|native| {
                    native
                        .execute_batch(&sql)
                        .map_err(|error| Error::query(Stage::Execute, error))
                })
            })
            .await
    }

    /// Runs `f` inside a transaction, committing when it succeeds and rolling
    /// back when it fails.
    ///
    /// When this connection is already in a transaction, `f` simply runs as
    /// part of it. If the returned future is dropped before the transaction
    /// ends, the transaction is rolled back on the connection's next use.
    pub async fn transaction<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Error>,
    {
        if self.0.in_transaction.swap(true, Ordering::AcqRel) {
            trace!("joining the running transaction");
            return f(self.clone()).await;
        }
        let mut guard = TransactionGuard {
            inner: &self.0,
            open: true,
        };

        if let Err(error) = self.execute_batch("BEGIN TRANSACTION").await {
            guard.open = false;
            return Err(error.into());
        }
        match f(self.clone()).await {
            Ok(value) => {
                self.execute_batch("COMMIT TRANSACTION").await?;
                guard.open = false;
                Ok(value)
            }
            Err(err) => {
                match self.execute_batch("ROLLBACK TRANSACTION").await {
                    Ok(()) => guard.open = false,
                    Err(rollback) => error!(%rollback, "failed to roll back transaction"),
                }
                Err(err)
            }
        }
    }

    /// Closes the connection. Closing twice is a no-op.
    ///
    /// Waits for a query still running on this connection to finish. While a
    /// stream is live, the native connection is released in the background
    /// once the stream's worker lets go of it.
    #[instrument(skip_all, fields(id = ?self.0.id))]
    pub async fn close(&self) -> DbResult<()> {
        if self.0.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.0.streaming.load(Ordering::Acquire) {
            debug!("deferring release until the live stream ends");
            let inner = Arc::clone(&self.0);
            tokio::spawn(async move {
                let pool = inner.pool.clone();
                let releasing = Arc::clone(&inner);
                let released = pool.run(move || {
                    releasing.release();
                    Ok(())
                });
                if let Err(error) = released.await {
                    warn!(%error, "deferred release failed to run on a worker");
                    let _ = tokio::task::spawn_blocking(move || inner.release()).await;
                }
            });
            return Ok(());
        }
        let inner = Arc::clone(&self.0);
        let released = self.0.pool.run(move || {
            inner.release();
            Ok(())
        });
        match released.await {
            Err(Error::WorkerPoolShutdown) => {
                self.0.release();
                Ok(())
            }
            other => other,
        }
    }
}

/// Clears the transaction flag when the outermost transaction ends.
///
/// `open` stays set from `BEGIN` until the matching `COMMIT` or `ROLLBACK`
/// succeeded. A guard dropped while open marks the connection so its next
/// use rolls back first.
struct TransactionGuard<'a> {
    inner: &'a Inner,
    open: bool,
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            warn!("transaction dropped before it ended, rolling back on next use");
            self.inner.abandoned.store(true, Ordering::Release);
        }
        self.inner.in_transaction.store(false, Ordering::Release);
    }
}

#[async_trait]
impl Executor for Connection {
    async fn execute_rows(
        &self,
        sql: &str,
        binds: &[Value],
        on_row: &mut (dyn FnMut(Row) -> DbResult<()> + Send),
    ) -> DbResult<()> {
        self.execute(sql, binds, on_row).await?
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.0.id)
            .field("target", &self.0.key.target)
            .field("closed", &self.is_closed())
            .finish()
    }
}

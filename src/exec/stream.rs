use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{ready, Context, Poll},
};

use futures_util::{Stream, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    error::{DbResult, Error},
    row::Row,
};

/// Marks a connection as serving a row stream until dropped.
#[derive(Debug)]
pub(crate) struct StreamSlot(Arc<AtomicBool>);

impl StreamSlot {
    /// Claims the slot, or returns `None` when a stream is already live.
    pub(crate) fn claim(flag: &Arc<AtomicBool>) -> Option<StreamSlot> {
        (!flag.swap(true, Ordering::AcqRel)).then(|| StreamSlot(Arc::clone(flag)))
    }
}

impl Drop for StreamSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Ordered rows of one query, produced by a worker.
///
/// Rows are yielded in the order the worker produced them. Once every row has
/// been received, the stream yields the worker's error, if any, and ends.
/// Dropping the stream early detaches from the worker, which stops at its next
/// delivery.
#[derive(Debug)]
pub struct RowStream {
    rows: Option<mpsc::Receiver<Row>>,
    worker: Option<JoinHandle<DbResult<usize>>>,
    slot: Option<StreamSlot>,
}

impl RowStream {
    pub(crate) fn new(
        rows: mpsc::Receiver<Row>,
        worker: JoinHandle<DbResult<usize>>,
        slot: StreamSlot,
    ) -> RowStream {
        RowStream {
            rows: Some(rows),
            worker: Some(worker),
            slot: Some(slot),
        }
    }

    /// Returns the next row, or `None` once the query completed successfully.
    pub async fn next_row(&mut self) -> DbResult<Option<Row>> {
        self.next().await.transpose()
    }

    /// Buffers every remaining row.
    pub async fn collect_rows(mut self) -> DbResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

impl Stream for RowStream {
    type Item = DbResult<Row>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(rows) = &mut self.rows {
            match ready!(rows.poll_recv(cx)) {
                Some(row) => return Poll::Ready(Some(Ok(row))),
                None => self.rows = None,
            }
        }

        let Some(worker) = &mut self.worker else {
            return Poll::Ready(None);
        };
        let outcome = ready!(Pin::new(worker).poll(cx));
        self.worker = None;
        self.slot = None;
        match outcome {
            Ok(Ok(_)) => Poll::Ready(None),
            Ok(Err(error)) => Poll::Ready(Some(Err(error))),
            Err(error) => Poll::Ready(Some(Err(Error::Worker(error.to_string())))),
        }
    }
}

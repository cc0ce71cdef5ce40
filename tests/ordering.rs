use std::time::Duration;

use duckbridge::{
    error::{DbResult, Error},
    exec::Executor,
    value::Value,
    Db,
};
use futures_util::StreamExt;
use tokio::time::{sleep, timeout};

mod test_utils;
use test_utils::*;

const ROWS: i64 = 10_000;

#[tokio::test]
async fn test_stream_preserves_order() -> DbResult<()> {
    setup_tracing(None);
    let (_db, conn) = memory().await?;

    let mut stream = conn
        .stream(
            "SELECT i FROM range(10000) r(i) WHERE i >= ?",
            &[Value::BigInt(0)],
        )
        .await?;
    let mut expected = 0;
    while let Some(row) = stream.next_row().await? {
        assert_eq!(row.get::<i64>("i")?, expected);
        expected += 1;
    }
    assert_eq!(expected, ROWS);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_callback_preserves_order() -> DbResult<()> {
    let (_db, conn) = memory().await?;

    let mut last = -1;
    let mut count = 0;
    conn.execute("SELECT i FROM range(10000) r(i)", &[], |row| {
        let i = row.get::<i64>("i")?;
        assert!(i > last, "received {i} after {last}");
        last = i;
        count += 1;
        Ok::<_, Error>(())
    })
    .await??;
    assert_eq!(count, ROWS);
    Ok(())
}

#[tokio::test]
async fn test_stream_trait() -> DbResult<()> {
    let (_db, conn) = memory().await?;
    let stream = conn.stream("SELECT i FROM range(5) r(i)", &[]).await?;
    let values: Vec<i64> = stream
        .map(|row| row.and_then(|row| row.get::<i64>("i")))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<DbResult<_>>()?;
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn test_error_after_rows() -> DbResult<()> {
    let (_db, conn) = memory().await?;
    // Fails part way through the result.
    let mut stream = conn
        .stream(
            "SELECT CASE WHEN i < 5000 THEN i ELSE error('boom') END AS i FROM range(10000) r(i)",
            &[],
        )
        .await?;

    let mut received = 0;
    let err = loop {
        match stream.next_row().await {
            Ok(Some(_)) => received += 1,
            Ok(None) => panic!("query should fail"),
            Err(err) => break err,
        }
    };
    assert!(matches!(err, Error::QueryExecution { .. }), "{err}");
    assert!(received < 10_000);
    // Ends after the error.
    assert!(stream.next_row().await?.is_none());

    // The failed stream no longer occupies the connection.
    assert_eq!(conn.query("SELECT 1 AS one", &[]).await?.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_keep_their_order() -> DbResult<()> {
    let db = Db::new(4);
    let conn = db.open_in_memory().await?;

    let mut tasks = Vec::new();
    for offset in 0..8i64 {
        let conn = db.open_in_memory().await?;
        tasks.push(tokio::spawn(async move {
            let rows = conn
                .fetch_all(
                    "SELECT i + ? AS v FROM range(2000) r(i)",
                    &[Value::BigInt(offset)],
                )
                .await?;
            let values = rows
                .iter()
                .map(|r| r.get::<i64>("v"))
                .collect::<DbResult<Vec<_>>>()?;
            let expected: Vec<i64> = (0..2000).map(|i| i + offset).collect();
            assert_eq!(values, expected);
            Ok::<_, Error>(())
        }));
    }
    for task in tasks {
        task.await.expect("query task panicked")?;
    }

    assert_eq!(db.registry().handles_created(), 1);
    drop(conn);
    Ok(())
}

#[tokio::test]
async fn test_dropped_stream_frees_the_connection() -> DbResult<()> {
    let (_db, conn) = memory().await?;
    let mut stream = conn.stream("SELECT i FROM range(100000) r(i)", &[]).await?;
    assert!(stream.next_row().await?.is_some());
    drop(stream);

    // The abandoned worker stops at its next delivery and releases the
    // native connection.
    let rows = conn.query("SELECT 1 AS one", &[]).await?;
    assert_eq!(rows.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_query_while_streaming_is_busy() -> DbResult<()> {
    let (_db, conn) = memory().await?;
    let mut stream = conn.stream("SELECT i FROM range(5000) r(i)", &[]).await?;
    assert!(stream.next_row().await?.is_some());

    let err = timeout(Duration::from_secs(5), conn.query("SELECT 1", &[]))
        .await
        .expect("a second query must fail fast")
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionBusy), "{err}");

    let err = conn.execute_batch("SELECT 1").await.unwrap_err();
    assert!(matches!(err, Error::ConnectionBusy), "{err}");

    // A clone shares the connection and sees the same stream.
    let err = conn.clone().stream("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionBusy), "{err}");

    drop(stream);
    let rows = conn.query("SELECT 1 AS one", &[]).await?;
    assert_eq!(rows[0].get::<i32>("one")?, 1);
    Ok(())
}

#[tokio::test]
async fn test_drained_stream_frees_the_connection() -> DbResult<()> {
    let (_db, conn) = memory().await?;
    let stream = conn.stream("SELECT i FROM range(3000) r(i)", &[]).await?;
    let rows = stream.collect_rows().await?;
    assert_eq!(rows.len(), 3000);

    conn.execute_batch("CREATE TABLE after_stream(i INTEGER)").await?;
    Ok(())
}

#[tokio::test]
async fn test_close_while_streaming_returns_promptly() -> DbResult<()> {
    let (db, conn) = memory().await?;
    let mut stream = conn.stream("SELECT i FROM range(5000) r(i)", &[]).await?;
    assert!(stream.next_row().await?.is_some());

    timeout(Duration::from_secs(5), conn.close())
        .await
        .expect("close must not wait for an undrained stream")?;
    assert!(conn.is_closed());
    assert!(matches!(
        conn.query("SELECT 1", &[]).await,
        Err(Error::ConnectionClosed)
    ));

    // The native connection is released once the worker lets go of it.
    drop(stream);
    for _ in 0..250 {
        if db.registry().handle_count() == 0 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(db.registry().handle_count(), 0);
    Ok(())
}

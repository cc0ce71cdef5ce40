use duckbridge::{
    error::{DbResult, Error, FailureKind},
    value::Value,
};
use pretty_assertions::assert_eq;

mod test_utils;
use test_utils::*;

#[tokio::test]
async fn test_create_insert_select() -> DbResult<()> {
    setup_tracing(None);
    let (_db, conn) = memory().await?;

    let rows = conn.query("CREATE TABLE t(i INTEGER, s VARCHAR)", &[]).await?;
    assert!(rows.is_empty());

    conn.query(
        "INSERT INTO t VALUES (?, ?)",
        &[Value::Int(7), Value::Text("x".into())],
    )
    .await?;

    let rows = conn.query("SELECT i, s FROM t", &[]).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].column("i"), Some(&Value::Int(7)));
    assert_eq!(rows[0].column("s"), Some(&Value::Text("x".into())));
    assert_eq!(rows[0].column("missing"), None);
    assert_eq!(rows[0].to_string(), "[i: 7, s: x]");
    Ok(())
}

#[tokio::test]
async fn test_callback_form() -> DbResult<()> {
    let (_db, conn) = memory().await?;
    conn.execute_batch("CREATE TABLE t(i INTEGER); INSERT INTO t VALUES (1), (2), (3)").await?;

    let mut sum = 0;
    conn.execute("SELECT i FROM t", &[], |row| {
        sum += row.get::<i64>("i")?;
        Ok::<_, Error>(())
    })
    .await??;
    assert_eq!(sum, 6);
    Ok(())
}

#[tokio::test]
async fn test_callback_error_is_returned() -> DbResult<()> {
    let (_db, conn) = memory().await?;

    let mut seen = Vec::new();
    let res = conn
        .execute("SELECT * FROM range(10) r(i)", &[], |row| {
            let i = row.get::<i64>("i").unwrap();
            seen.push(i);
            if i == 3 {
                return Err("stop");
            }
            Ok(())
        })
        .await?;
    assert_eq!(res, Err("stop"));
    assert_eq!(seen, vec![0, 1, 2, 3]);

    // The connection stays usable.
    let rows = conn.query("SELECT 1 AS one", &[]).await?;
    assert_eq!(rows[0].get::<i32>("one")?, 1);
    Ok(())
}

#[tokio::test]
async fn test_bind_arity_mismatch() -> DbResult<()> {
    let (_db, conn) = memory().await?;
    let err = conn.query("SELECT ?", &[]).await.unwrap_err();
    assert!(
        matches!(err, Error::BindArity { expected: 1, actual: 0 }),
        "{err}"
    );
    Ok(())
}

#[tokio::test]
async fn test_syntax_error() -> DbResult<()> {
    let (_db, conn) = memory().await?;
    let err = conn.query("SELEKT 1", &[]).await.unwrap_err();
    assert!(err.is_syntax_error(), "{err}");
    assert_eq!(err.failure_kind(), Some(FailureKind::Syntax));
    Ok(())
}

#[tokio::test]
async fn test_constraint_violation() -> DbResult<()> {
    let (_db, conn) = memory().await?;
    conn.execute_batch("CREATE TABLE t(id INTEGER PRIMARY KEY)").await?;
    conn.query("INSERT INTO t VALUES (?)", &[Value::Int(1)]).await?;

    let err = conn
        .query("INSERT INTO t VALUES (?)", &[Value::Int(1)])
        .await
        .unwrap_err();
    assert!(err.is_constraint_failure(), "{err}");
    Ok(())
}

#[tokio::test]
async fn test_closed_connection() -> DbResult<()> {
    let (db, conn) = memory().await?;
    conn.close().await?;
    // Idempotent.
    conn.close().await?;
    assert!(conn.is_closed());

    let err = conn.query("SELECT 1", &[]).await.unwrap_err();
    assert!(err.is_connection_closed(), "{err}");
    assert_eq!(db.registry().handle_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_rejects_work() -> DbResult<()> {
    let (db, conn) = memory().await?;
    db.shutdown();
    let err = conn.query("SELECT 1", &[]).await.unwrap_err();
    assert!(matches!(err, Error::WorkerPoolShutdown));

    // Closing still releases the handle.
    conn.close().await?;
    assert_eq!(db.registry().handle_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_decode_row_into_struct() -> DbResult<()> {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Item {
        id: i64,
        name: String,
        price: Option<f64>,
    }

    let (_db, conn) = memory().await?;
    let rows = conn
        .query("SELECT 1 AS id, 'pen' AS name, NULL::DOUBLE AS price", &[])
        .await?;
    assert_eq!(
        rows[0].decode::<Item>()?,
        Item {
            id: 1,
            name: "pen".into(),
            price: None
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_generic_binds() -> DbResult<()> {
    use duckbridge::codec::{self, Binds};

    #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
    struct Meta {
        tags: Vec<String>,
    }

    let (_db, conn) = memory().await?;
    conn.execute_batch("CREATE TABLE t(id BIGINT, meta VARCHAR)").await?;

    let meta = Meta {
        tags: vec!["a".into(), "b".into()],
    };
    let mut binds = Binds::new();
    binds.push(&5i64).encode(&meta)?;
    conn.query("INSERT INTO t VALUES (?, ?)", &binds).await?;

    let rows = conn.query("SELECT id, meta FROM t", &[]).await?;
    assert_eq!(rows[0].get::<i64>("id")?, 5);
    assert_eq!(rows[0].get_decoded::<Meta>("meta")?, meta);
    assert_eq!(
        codec::decode::<Meta>(rows[0].column("meta").expect("column meta"))?,
        meta
    );
    Ok(())
}

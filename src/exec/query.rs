use std::sync::Arc;

use duckdb::arrow::record_batch::RecordBatch;
use tracing::{debug, trace};

use crate::{
    error::{DbResult, Error, Stage},
    exec::materialize::{ArrowBatch, Materializer},
    row::{ColumnIndex, Row},
    value::Value,
};

/// Prepares, binds and runs `sql` on the given native connection, handing every
/// produced row to `deliver` in order.
///
/// Blocks the calling thread until the result is exhausted or `deliver` fails.
/// Returns the number of delivered rows.
pub(crate) fn run<F>(
    native: &duckdb::Connection,
    sql: &str,
    binds: &[Value],
    mut deliver: F,
) -> DbResult<usize>
where
    F: FnMut(Row) -> DbResult<()>,
{
    debug!(sql, binds = binds.len(), "executing query");

    let mut stmt = native
        .prepare(sql)
        .map_err(|error| Error::query(Stage::Prepare, error))?;

    let expected = stmt.parameter_count();
    if expected != binds.len() {
        return Err(Error::BindArity {
            expected,
            actual: binds.len(),
        });
    }
    for (i, value) in binds.iter().enumerate() {
        value.bind(&mut stmt, i + 1)?;
    }

    stmt.raw_execute()
        .map_err(|error| Error::query(Stage::Execute, error))?;

    let columns = Arc::new(ColumnIndex::new(stmt.column_names()));
    let materializer = Materializer::new(columns);

    let mut total = 0;
    while let Some(batch) = stmt
        .step()
        .map_err(|error| Error::query(Stage::Execute, error))?
    {
        let batch = RecordBatch::from(batch);
        total += materializer.materialize(&ArrowBatch::new(&batch), &mut deliver)?;
    }

    trace!(rows = total, "query finished");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(conn: &duckdb::Connection, sql: &str, binds: &[Value]) -> DbResult<Vec<Row>> {
        let mut rows = Vec::new();
        run(conn, sql, binds, |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    #[test]
    fn test_select_with_binds() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        let rows = collect(&conn, "SELECT ? + 1 AS x, ? AS s", &[Value::Int(41), "hi".into()]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<i64>("x").unwrap(), 42);
        assert_eq!(rows[0].column("s"), Some(&Value::Text("hi".into())));
    }

    #[test]
    fn test_arity_checked_before_binding() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        let err = collect(&conn, "SELECT ?", &[]).unwrap_err();
        assert!(matches!(err, Error::BindArity { expected: 1, actual: 0 }));
        let err = collect(&conn, "SELECT 1", &[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, Error::BindArity { expected: 0, actual: 1 }));
    }

    #[test]
    fn test_prepare_failure_is_syntax() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        let err = collect(&conn, "SELEC 1", &[]).unwrap_err();
        assert!(err.is_syntax_error(), "{err}");
        let err = collect(&conn, "SELECT * FROM missing_table", &[]).unwrap_err();
        assert!(err.is_syntax_error(), "{err}");
    }

    #[test]
    fn test_deliver_error_stops() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        let mut seen = 0;
        let res = run(&conn, "SELECT * FROM range(100)", &[], |_| {
            seen += 1;
            Err(Error::Delivery)
        });
        assert!(matches!(res, Err(Error::Delivery)));
        assert_eq!(seen, 1);
    }
}

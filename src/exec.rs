use async_trait::async_trait;

use crate::{error::DbResult, row::Row, value::Value};

pub mod materialize;

pub(crate) mod query;

mod stream;
pub use stream::*;

/// Query execution seam.
///
/// Implementors run `sql` with the given positional binds and hand each result
/// row, in order, to `on_row`. An error returned by `on_row` stops the query and
/// is returned as-is.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute_rows(
        &self,
        sql: &str,
        binds: &[Value],
        on_row: &mut (dyn FnMut(Row) -> DbResult<()> + Send),
    ) -> DbResult<()>;

    /// Runs the query and buffers every row.
    async fn fetch_all(&self, sql: &str, binds: &[Value]) -> DbResult<Vec<Row>> {
        let mut rows = Vec::new();
        self.execute_rows(sql, binds, &mut |row| {
            rows.push(row);
            Ok(())
        })
        .await?;
        Ok(rows)
    }
}

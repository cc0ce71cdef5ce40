use std::sync::Arc;

use duckdb::arrow::{array::Array, record_batch::RecordBatch};
use tracing::trace;

use crate::{
    error::DbResult,
    row::{ColumnIndex, Row},
    value::{NativeType, Value},
};

/// A completed columnar result: a fixed number of typed columns, each holding
/// some number of valid cells.
pub trait ColumnarResult {
    fn column_count(&self) -> usize;

    fn native_type(&self, column: usize) -> NativeType;

    /// Number of valid cells in the given column.
    fn column_len(&self, column: usize) -> usize;

    /// Reads one cell of a column tagged `ty`. Only called for positions below
    /// `column_len`.
    fn read(&self, column: usize, ty: NativeType, pos: usize) -> Value;
}

/// A batch of engine output in Arrow form.
pub struct ArrowBatch<'a> {
    batch: &'a RecordBatch,
}

impl<'a> ArrowBatch<'a> {
    pub fn new(batch: &'a RecordBatch) -> ArrowBatch<'a> {
        ArrowBatch { batch }
    }
}

impl ColumnarResult for ArrowBatch<'_> {
    fn column_count(&self) -> usize {
        self.batch.num_columns()
    }

    fn native_type(&self, column: usize) -> NativeType {
        NativeType::from_field(self.batch.schema_ref().field(column))
    }

    fn column_len(&self, column: usize) -> usize {
        self.batch.column(column).len()
    }

    fn read(&self, column: usize, ty: NativeType, pos: usize) -> Value {
        ty.decode(self.batch.column(column).as_ref(), pos)
    }
}

/// Turns columnar results into rows sharing one column index.
pub struct Materializer {
    columns: Arc<ColumnIndex>,
}

impl Materializer {
    pub fn new(columns: Arc<ColumnIndex>) -> Materializer {
        Materializer { columns }
    }

    pub fn columns(&self) -> &Arc<ColumnIndex> {
        &self.columns
    }

    /// Produces one row per position, in order, passing each to `sink`.
    ///
    /// Rows end at the first position that is out of range for any column.
    /// A result without columns produces no rows. Returns the number of rows
    /// produced.
    pub fn materialize<R, F>(&self, result: &R, mut sink: F) -> DbResult<usize>
    where
        R: ColumnarResult + ?Sized,
        F: FnMut(Row) -> DbResult<()>,
    {
        let width = result.column_count();
        if width == 0 {
            return Ok(0);
        }

        let types: Vec<_> = (0..width).map(|c| result.native_type(c)).collect();
        let mut pos = 0;
        'rows: loop {
            let mut values = Vec::with_capacity(width);
            for (column, &ty) in types.iter().enumerate() {
                if pos >= result.column_len(column) {
                    break 'rows;
                }
                values.push(result.read(column, ty, pos));
            }
            sink(Row::new(Arc::clone(&self.columns), values))?;
            pos += 1;
        }

        trace!(rows = pos, width, "materialized batch");
        Ok(pos)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Columns of `Option<i64>`, where `None` is a null cell.
    struct FakeResult(Vec<Vec<Option<i64>>>);

    impl ColumnarResult for FakeResult {
        fn column_count(&self) -> usize {
            self.0.len()
        }

        fn native_type(&self, _column: usize) -> NativeType {
            NativeType::BigInt
        }

        fn column_len(&self, column: usize) -> usize {
            self.0[column].len()
        }

        fn read(&self, column: usize, _ty: NativeType, pos: usize) -> Value {
            self.0[column][pos].map_or(Value::Null, Value::BigInt)
        }
    }

    fn materializer(names: &[&str]) -> Materializer {
        let names = names.iter().map(|s| s.to_string()).collect();
        Materializer::new(Arc::new(ColumnIndex::new(names)))
    }

    fn collect(m: &Materializer, result: &FakeResult) -> Vec<Vec<Value>> {
        let mut rows = Vec::new();
        m.materialize(result, |row| {
            rows.push(row.into_values());
            Ok(())
        })
        .unwrap();
        rows
    }

    #[test]
    fn test_nulls_keep_row_shape() {
        let result = FakeResult(vec![
            vec![Some(1), Some(2), Some(3)],
            vec![Some(10), None, Some(30)],
        ]);
        let rows = collect(&materializer(&["a", "b"]), &result);
        assert_eq!(
            rows,
            vec![
                vec![Value::BigInt(1), Value::BigInt(10)],
                vec![Value::BigInt(2), Value::Null],
                vec![Value::BigInt(3), Value::BigInt(30)],
            ]
        );
    }

    #[test]
    fn test_ends_at_shortest_column() {
        let result = FakeResult(vec![vec![Some(1), Some(2)], vec![Some(1)]]);
        assert_eq!(collect(&materializer(&["a", "b"]), &result).len(), 1);
    }

    #[test]
    fn test_zero_width() {
        let result = FakeResult(vec![]);
        assert!(collect(&materializer(&[]), &result).is_empty());
    }

    #[test]
    fn test_rows_share_index() {
        let m = materializer(&["a"]);
        let result = FakeResult(vec![vec![Some(1), Some(2)]]);
        let mut rows = Vec::new();
        m.materialize(&result, |row| {
            rows.push(row);
            Ok(())
        })
        .unwrap();
        // One reference held by the materializer, one per row.
        assert_eq!(Arc::strong_count(m.columns()), 3);
        assert_eq!(rows[1].column("a"), Some(&Value::BigInt(2)));
    }

    #[test]
    fn test_sink_error_stops() {
        let m = materializer(&["a"]);
        let result = FakeResult(vec![vec![Some(1), Some(2), Some(3)]]);
        let mut seen = 0;
        let res = m.materialize(&result, |_| {
            seen += 1;
            Err(crate::error::Error::Delivery)
        });
        assert!(res.is_err());
        assert_eq!(seen, 1);
    }
}

pub mod postgres;
pub mod postgres_async;
pub mod statement;

use crate::convert::{ColumnSpec, TableRecord};
use crate::error::LakesqlError;
use crate::escape::{build_insert_sql, Dialect};
use crate::row::{Row, Value};

/// Rows per inlined INSERT statement in the default `save_table`.
const INSERT_BATCH_SIZE: usize = 1000;

/// How `save_table` treats existing table contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Append,
    Overwrite,
}

/// Lazy, finite, non-restartable row sequence; each `fetch` call issues a
/// new query.
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Row, LakesqlError>> + 'a>;

/// A concrete executor of SQL against one storage/compute target.
///
/// Higher-level operations (`fetch_one`, `save_table`, `create_table`, …)
/// are built only from `execute` and `fetch`. Backends with bound-parameter
/// support override `save_table` with parameterized inserts; the default
/// batches inlined, escaped literals.
pub trait SqlBackend {
    fn dialect(&self) -> Dialect;

    /// Execute a statement, returning the affected row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, LakesqlError>;

    /// Execute a query and stream its rows.
    fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<RowIter<'_>, LakesqlError>;

    /// First row of the result, if any.
    fn fetch_one(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>, LakesqlError> {
        let mut rows = self.fetch(sql, params)?;
        rows.next().transpose()
    }

    /// First column of the first row, if any.
    fn fetch_value(&mut self, sql: &str, params: &[Value]) -> Result<Option<Value>, LakesqlError> {
        Ok(self
            .fetch_one(sql, params)?
            .and_then(|row| row.get(0).cloned()))
    }

    /// Materialize the full result set.
    fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, LakesqlError> {
        self.fetch(sql, params)?.collect()
    }

    /// Insert rows, truncating first in overwrite mode. An empty row set
    /// is a no-op, with no TRUNCATE either.
    fn save_table(
        &mut self,
        full_name: &str,
        columns: &[ColumnSpec],
        rows: &[Vec<Value>],
        mode: SaveMode,
    ) -> Result<(), LakesqlError> {
        if rows.is_empty() {
            return Ok(());
        }
        let dialect = self.dialect();
        if mode == SaveMode::Overwrite {
            let table = dialect.escape_full_name(full_name);
            self.execute(&format!("TRUNCATE TABLE {table}"), &[])?;
        }
        for batch in rows.chunks(INSERT_BATCH_SIZE) {
            let sql = build_insert_sql(dialect, full_name, columns, batch);
            self.execute(&sql, &[])?;
        }
        Ok(())
    }

    /// Idempotent table creation from a typed record description.
    fn create_table(&mut self, full_name: &str, columns: &[ColumnSpec]) -> Result<(), LakesqlError> {
        let dialect = self.dialect();
        let col_defs = columns
            .iter()
            .map(|c| {
                format!(
                    "{} {}",
                    dialect.escape_name(&c.name),
                    c.ty.native_type(dialect)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            dialect.escape_full_name(full_name),
            col_defs
        );
        if dialect == Dialect::Warehouse {
            sql.push_str(" USING DELTA");
        }
        self.execute(&sql, &[])?;
        Ok(())
    }
}

/// Save typed records through a backend's `save_table`.
pub fn save_records<B, R>(
    backend: &mut B,
    full_name: &str,
    records: &[R],
    mode: SaveMode,
) -> Result<(), LakesqlError>
where
    B: SqlBackend + ?Sized,
    R: TableRecord,
{
    let columns = R::columns();
    let rows: Vec<Vec<Value>> = records.iter().map(TableRecord::to_values).collect();
    backend.save_table(full_name, &columns, &rows, mode)
}

/// Create the table a record type describes.
pub fn create_table_for<B, R>(backend: &mut B, full_name: &str) -> Result<(), LakesqlError>
where
    B: SqlBackend + ?Sized,
    R: TableRecord,
{
    backend.create_table(full_name, &R::columns())
}

/// Fetch rows and rebuild them as typed records.
pub fn fetch_records<B, R>(backend: &mut B, sql: &str) -> Result<Vec<R>, LakesqlError>
where
    B: SqlBackend + ?Sized,
    R: TableRecord,
{
    backend
        .fetch(sql, &[])?
        .map(|row| row.and_then(|row| R::from_row(&row)))
        .collect()
}

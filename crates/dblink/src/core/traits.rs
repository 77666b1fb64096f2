//! Backend client interface.
//!
//! These traits describe what the link needs from a relational client:
//!
//! - [`Driver`]: opens connections for one data source
//! - [`Connection`]: parameterized execution, cursors, calls, transactions
//!   and catalog reads
//! - [`Cursor`]: a live, possibly scrollable row iterator
//! - [`CallHandle`]: a prepared procedure call with positional slots
//!
//! Backends differ in what they support; [`Capabilities`] tells the link
//! which features must be emulated.

use async_trait::async_trait;

use crate::error::Result;

use super::procedure::ReturnFlavor;
use super::schema::{ColumnMeta, SqlType};
use super::value::{Row, SqlValue};

/// Navigation abilities of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorKind {
    /// Can only move forward.
    ForwardOnly,
    /// Scrollable; does not see concurrent changes.
    ScrollInsensitive,
    /// Scrollable; sees concurrent changes.
    ScrollSensitive,
}

impl CursorKind {
    /// Whether the cursor can move backwards and jump.
    pub fn is_scrollable(self) -> bool {
        !matches!(self, CursorKind::ForwardOnly)
    }
}

/// Backend feature flags consulted before issuing work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Backend applies OFFSET/LIMIT itself.
    pub native_offset: bool,
    /// Backend can return generated keys from a write.
    pub generated_keys: bool,
    /// Backend can open scrollable cursors.
    pub scroll_cursors: bool,
    /// Backend can open scroll-sensitive cursors.
    pub sensitive_scroll: bool,
    /// Backend supports savepoints.
    pub savepoints: bool,
    /// Identifiers compare case-sensitively.
    pub case_sensitive_identifiers: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            native_offset: false,
            generated_keys: false,
            scroll_cursors: true,
            sensitive_scroll: false,
            savepoints: false,
            case_sensitive_identifiers: false,
        }
    }
}

/// Bounds passed down to a connection for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Rows to skip natively (only set when the backend supports it).
    pub offset: Option<u64>,
    /// Rows to return natively (only set when the backend supports it).
    pub limit: Option<u64>,
    /// Upper bound on rows fetched, applied by the client.
    pub max_rows: Option<u64>,
}

/// Fully materialized query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rowset {
    /// Result column shape.
    pub columns: Vec<ColumnMeta>,
    /// Rows in backend order.
    pub rows: Vec<Row>,
}

impl Rowset {
    /// Create a rowset.
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// First value of the first row.
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|r| r.first())
    }
}

/// A table-like object listed in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTable {
    pub schema: String,
    pub name: String,
    /// Backend type string, e.g. `BASE TABLE`, `VIEW`.
    pub table_type: String,
}

/// Catalog view of a column; probes may omit defaults, the catalog does not.
///
/// Zero sizes and `None` flags mean the catalog did not say.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub type_name: String,
    pub length: i32,
    pub scale: i32,
    pub nullable: Option<bool>,
    pub auto_increment: bool,
    pub default: Option<String>,
}

/// One column of one index, in backend report order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogIndexColumn {
    pub index_name: String,
    pub unique: bool,
    pub column: String,
    /// 1-based position within the index.
    pub ordinal: i32,
}

/// One column pair of an exported (referenced-by) foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogKeyColumn {
    pub fk_name: String,
    pub pk_table: String,
    pub pk_column: String,
    pub fk_table: String,
    pub fk_column: String,
    /// 1-based sequence within the key; resets to 1 for each new key.
    pub key_seq: i32,
}

/// Procedure signature from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogProcedure {
    pub name: String,
    /// Return type name; `None` for procedures without a return value.
    pub return_type: Option<String>,
    /// Whether the routine returns a set of rows.
    pub returns_set: bool,
    pub params: Vec<CatalogProcedureParam>,
}

/// One parameter of a catalog procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogProcedureParam {
    pub name: String,
    /// `IN`, `OUT` or `INOUT`.
    pub mode: String,
    pub type_name: String,
}

/// A live row iterator.
///
/// Row numbers are 1-based; position 0 is "before first".
#[async_trait]
pub trait Cursor: Send {
    /// Result column shape.
    fn columns(&self) -> &[ColumnMeta];

    /// Navigation abilities.
    fn kind(&self) -> CursorKind;

    /// Current row number (0 before the first row).
    fn position(&self) -> i64;

    /// Move onto `row`; 0 is before first, negative counts back from the end.
    ///
    /// Returns whether the cursor now sits on a row.
    async fn absolute(&mut self, row: i64) -> Result<bool>;

    /// Advance one row and return it.
    async fn next(&mut self) -> Result<Option<Row>>;

    /// Step back one row and return it.
    async fn previous(&mut self) -> Result<Option<Row>>;

    /// Read up to `count` rows forward.
    async fn fetch(&mut self, count: usize) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(count.min(1024));
        while rows.len() < count {
            match self.next().await? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    /// Move onto the last row and return its number (0 when empty).
    async fn last(&mut self) -> Result<i64>;

    /// Release the cursor.
    async fn close(&mut self) -> Result<()>;
}

/// A prepared procedure call with 1-based positional slots.
#[async_trait]
pub trait CallHandle: Send {
    /// Bind an input value.
    fn set(&mut self, index: usize, value: SqlValue) -> Result<()>;

    /// Register an output slot.
    fn register_out(&mut self, index: usize, sql_type: &SqlType) -> Result<()>;

    /// Execute the call.
    async fn execute(&mut self) -> Result<()>;

    /// Read an output slot after execution.
    fn get(&self, index: usize) -> Result<SqlValue>;

    /// Take the result cursor produced by the call, if any.
    fn take_cursor(&mut self) -> Option<Box<dyn Cursor>>;

    /// Release the handle.
    async fn close(&mut self) -> Result<()>;
}

/// A live backend connection.
#[async_trait]
pub trait Connection: Send {
    /// Feature flags of the backend.
    fn capabilities(&self) -> Capabilities;

    /// Run a query and materialize its rows.
    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        opts: &QueryOptions,
    ) -> Result<Rowset>;

    /// Open a live cursor over a query.
    async fn open_cursor(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        kind: CursorKind,
    ) -> Result<Box<dyn Cursor>>;

    /// Execute a statement, returning the affected row count.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Execute a statement asking for generated keys.
    ///
    /// Backends reject this mode for statements that cannot return keys.
    async fn execute_returning_keys(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<(u64, Rowset)>;

    /// Prepare a call from its `{call ...}` invocation text.
    async fn prepare_call(
        &mut self,
        call_text: &str,
        flavor: ReturnFlavor,
    ) -> Result<Box<dyn CallHandle>>;

    /// Leave auto-commit mode.
    async fn begin(&mut self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Whether a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Create a savepoint.
    async fn savepoint(&mut self, name: &str) -> Result<()>;

    /// Roll back to a savepoint.
    async fn rollback_to(&mut self, name: &str) -> Result<()>;

    /// Release a savepoint.
    async fn release_savepoint(&mut self, name: &str) -> Result<()>;

    /// List tables, views and other relations in a schema.
    async fn catalog_tables(&mut self, schema: &str) -> Result<Vec<CatalogTable>>;

    /// Columns of a table with their catalog defaults.
    async fn catalog_columns(&mut self, schema: &str, table: &str) -> Result<Vec<CatalogColumn>>;

    /// Primary key columns in key order.
    async fn catalog_primary_key(&mut self, schema: &str, table: &str) -> Result<Vec<String>>;

    /// Non-primary index columns, one entry per indexed column.
    async fn catalog_indexes(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<CatalogIndexColumn>>;

    /// Foreign keys referencing this table, one entry per column pair.
    async fn catalog_exported_keys(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<CatalogKeyColumn>>;

    /// Procedure signature, if the procedure exists.
    async fn catalog_procedure(
        &mut self,
        schema: &str,
        name: &str,
    ) -> Result<Option<CatalogProcedure>>;

    /// Cheap liveness check.
    async fn ping(&mut self) -> Result<()>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Opens connections for one configured data source.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Backend identifier (e.g. "postgres").
    fn name(&self) -> &str;

    /// Establish a new connection.
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_default_is_conservative() {
        let caps = Capabilities::default();
        assert!(!caps.native_offset);
        assert!(!caps.generated_keys);
        assert!(!caps.sensitive_scroll);
    }

    #[test]
    fn test_rowset_helpers() {
        let rs = Rowset::new(
            vec![ColumnMeta::new("Total", "int8")],
            vec![vec![SqlValue::I64(12)]],
        );
        assert_eq!(rs.column_index("total"), Some(0));
        assert_eq!(rs.scalar(), Some(&SqlValue::I64(12)));
        assert_eq!(rs.len(), 1);
    }

    #[test]
    fn test_cursor_kind_scrollable() {
        assert!(!CursorKind::ForwardOnly.is_scrollable());
        assert!(CursorKind::ScrollInsensitive.is_scrollable());
    }
}

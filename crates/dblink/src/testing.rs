//! In-memory backend used by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::core::procedure::ReturnFlavor;
use crate::core::schema::{ColumnMeta, SqlType};
use crate::core::traits::{
    CallHandle, Capabilities, CatalogColumn, CatalogIndexColumn, CatalogKeyColumn,
    CatalogProcedure, CatalogTable, Connection, Cursor, CursorKind, Driver, QueryOptions, Rowset,
};
use crate::core::value::{Row, SqlValue};
use crate::error::{DbError, Result};

/// Rows `1..=n` with a single integer column `n`.
pub fn numbered_rows(n: i64) -> Vec<Row> {
    (1..=n).map(|i| vec![SqlValue::I64(i)]).collect()
}

/// Scrollable cursor over a fixed row list that counts fetches.
pub struct VecCursor {
    columns: Vec<ColumnMeta>,
    rows: Vec<Row>,
    kind: CursorKind,
    pos: i64,
    pub fetches: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl VecCursor {
    pub fn new(rows: Vec<Row>, kind: CursorKind) -> Self {
        Self {
            columns: vec![ColumnMeta::new("n", "int8")],
            rows,
            kind,
            pos: 0,
            fetches: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn len(&self) -> i64 {
        self.rows.len() as i64
    }

    fn row_at(&self, pos: i64) -> Option<Row> {
        if pos >= 1 && pos <= self.len() {
            Some(self.rows[(pos - 1) as usize].clone())
        } else {
            None
        }
    }
}

#[async_trait]
impl Cursor for VecCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn kind(&self) -> CursorKind {
        self.kind
    }

    fn position(&self) -> i64 {
        self.pos
    }

    async fn absolute(&mut self, row: i64) -> Result<bool> {
        if !self.kind.is_scrollable() {
            return Err(DbError::Driver("cursor is forward-only".into()));
        }
        self.pos = if row >= 0 {
            row.min(self.len() + 1)
        } else {
            (self.len() + 1 + row).max(0)
        };
        Ok(self.row_at(self.pos).is_some())
    }

    async fn next(&mut self) -> Result<Option<Row>> {
        if self.pos <= self.len() {
            self.pos += 1;
        }
        Ok(self.row_at(self.pos))
    }

    async fn previous(&mut self) -> Result<Option<Row>> {
        if !self.kind.is_scrollable() {
            return Err(DbError::Driver("cursor is forward-only".into()));
        }
        if self.pos > 0 {
            self.pos -= 1;
        }
        Ok(self.row_at(self.pos))
    }

    async fn fetch(&mut self, count: usize) -> Result<Vec<Row>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut rows = Vec::new();
        while rows.len() < count {
            match self.next().await? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    async fn last(&mut self) -> Result<i64> {
        self.pos = self.len();
        Ok(self.len())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Everything the mock records, shared with the test through an `Arc`.
#[derive(Debug, Default)]
pub struct MockLog {
    pub connects: usize,
    pub executed: Vec<String>,
    pub queries: Vec<(String, QueryOptions)>,
    pub keyed_attempts: usize,
    pub cursor_kinds: Vec<CursorKind>,
    pub call_texts: Vec<String>,
    pub bound: Vec<(usize, SqlValue)>,
    pub registered: Vec<usize>,
    pub calls_closed: usize,
    pub transaction_events: Vec<String>,
    pub closed: bool,
}

/// Scripted procedure behavior.
#[derive(Debug, Clone, Default)]
pub struct MockCallScript {
    /// Values returned from `get(index)`.
    pub outputs: HashMap<usize, SqlValue>,
    /// Rows for a result cursor, if the call produces one.
    pub cursor_rows: Option<Vec<Row>>,
    /// Fail `execute`.
    pub fail: bool,
    /// Fail `close`.
    pub fail_close: bool,
}

/// Configuration and catalog contents of the mock backend.
#[derive(Clone, Default)]
pub struct MockBackend {
    pub caps: Capabilities,
    pub data: Vec<Row>,
    pub reject_keys: bool,
    pub fail_commit: bool,
    pub tables: Vec<CatalogTable>,
    pub probe_columns: HashMap<String, Vec<ColumnMeta>>,
    pub catalog_columns: HashMap<String, Vec<CatalogColumn>>,
    pub primary_keys: HashMap<String, Vec<String>>,
    pub indexes: HashMap<String, Vec<CatalogIndexColumn>>,
    pub exported_keys: HashMap<String, Vec<CatalogKeyColumn>>,
    pub row_counts: HashMap<String, i64>,
    pub broken_tables: HashSet<String>,
    pub procedures: HashMap<String, CatalogProcedure>,
    pub call: MockCallScript,
    pub log: Arc<Mutex<MockLog>>,
}

impl MockBackend {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            ..Default::default()
        }
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, MockLog> {
        self.log.lock().expect("mock log poisoned")
    }

    pub fn driver(&self) -> Arc<dyn Driver> {
        Arc::new(MockDriver {
            backend: self.clone(),
        })
    }

    /// Find the table a generated statement refers to.
    fn table_in(&self, sql: &str) -> Option<String> {
        self.tables
            .iter()
            .map(|t| t.name.clone())
            .filter(|name| sql.contains(&format!("\"{}\"", name)))
            .max_by_key(|name| name.len())
    }
}

pub struct MockDriver {
    backend: MockBackend,
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        self.backend.log().connects += 1;
        Ok(Box::new(MockConnection {
            backend: self.backend.clone(),
            in_tx: false,
        }))
    }
}

pub struct MockConnection {
    backend: MockBackend,
    in_tx: bool,
}

impl MockConnection {
    fn event(&self, event: impl Into<String>) {
        self.backend.log().transaction_events.push(event.into());
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn capabilities(&self) -> Capabilities {
        self.backend.caps
    }

    async fn query(
        &mut self,
        sql: &str,
        _params: &[SqlValue],
        opts: &QueryOptions,
    ) -> Result<Rowset> {
        self.backend.log().queries.push((sql.to_string(), *opts));

        if let Some(table) = self.backend.table_in(sql) {
            if self.backend.broken_tables.contains(&table) {
                return Err(DbError::Driver(format!("relation \"{}\" is broken", table)));
            }
            if sql.contains("WHERE 1 = 0") {
                let columns = self
                    .backend
                    .probe_columns
                    .get(&table)
                    .cloned()
                    .unwrap_or_default();
                return Ok(Rowset::new(columns, Vec::new()));
            }
            if sql.starts_with("SELECT COUNT(*)") {
                return match self.backend.row_counts.get(&table) {
                    Some(n) => Ok(Rowset::new(
                        vec![ColumnMeta::new("count", "int8")],
                        vec![vec![SqlValue::I64(*n)]],
                    )),
                    None => Err(DbError::Driver("permission denied".into())),
                };
            }
        }

        let mut rows = self.backend.data.clone();
        let offset = opts.offset.unwrap_or(0) as usize;
        rows.drain(..offset.min(rows.len()));
        if let Some(limit) = opts.limit {
            rows.truncate(limit as usize);
        }
        if let Some(max) = opts.max_rows {
            rows.truncate(max as usize);
        }
        Ok(Rowset::new(vec![ColumnMeta::new("n", "int8")], rows))
    }

    async fn open_cursor(
        &mut self,
        _sql: &str,
        _params: &[SqlValue],
        kind: CursorKind,
    ) -> Result<Box<dyn Cursor>> {
        self.backend.log().cursor_kinds.push(kind);
        Ok(Box::new(VecCursor::new(self.backend.data.clone(), kind)))
    }

    async fn execute(&mut self, sql: &str, _params: &[SqlValue]) -> Result<u64> {
        self.backend.log().executed.push(sql.to_string());
        Ok(1)
    }

    async fn execute_returning_keys(
        &mut self,
        sql: &str,
        _params: &[SqlValue],
    ) -> Result<(u64, Rowset)> {
        self.backend.log().keyed_attempts += 1;
        if self.backend.reject_keys {
            return Err(DbError::Driver("generated keys not supported here".into()));
        }
        self.backend.log().executed.push(sql.to_string());
        Ok((
            1,
            Rowset::new(vec![ColumnMeta::new("id", "int8")], vec![vec![SqlValue::I64(42)]]),
        ))
    }

    async fn prepare_call(
        &mut self,
        call_text: &str,
        flavor: ReturnFlavor,
    ) -> Result<Box<dyn CallHandle>> {
        self.backend.log().call_texts.push(call_text.to_string());
        Ok(Box::new(MockCall {
            script: self.backend.call.clone(),
            log: self.backend.log.clone(),
            flavor,
            cursor: None,
        }))
    }

    async fn begin(&mut self) -> Result<()> {
        self.in_tx = true;
        self.event("begin");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.in_tx = false;
        self.event("commit");
        if self.backend.fail_commit {
            return Err(DbError::Driver("serialization failure".into()));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.in_tx = false;
        self.event("rollback");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }

    async fn savepoint(&mut self, name: &str) -> Result<()> {
        self.event(format!("savepoint {}", name));
        Ok(())
    }

    async fn rollback_to(&mut self, name: &str) -> Result<()> {
        self.event(format!("rollback_to {}", name));
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.event(format!("release {}", name));
        Ok(())
    }

    async fn catalog_tables(&mut self, _schema: &str) -> Result<Vec<CatalogTable>> {
        Ok(self.backend.tables.clone())
    }

    async fn catalog_columns(&mut self, _schema: &str, table: &str) -> Result<Vec<CatalogColumn>> {
        Ok(self
            .backend
            .catalog_columns
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    async fn catalog_primary_key(&mut self, _schema: &str, table: &str) -> Result<Vec<String>> {
        Ok(self
            .backend
            .primary_keys
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    async fn catalog_indexes(
        &mut self,
        _schema: &str,
        table: &str,
    ) -> Result<Vec<CatalogIndexColumn>> {
        Ok(self.backend.indexes.get(table).cloned().unwrap_or_default())
    }

    async fn catalog_exported_keys(
        &mut self,
        _schema: &str,
        table: &str,
    ) -> Result<Vec<CatalogKeyColumn>> {
        Ok(self
            .backend
            .exported_keys
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    async fn catalog_procedure(
        &mut self,
        _schema: &str,
        name: &str,
    ) -> Result<Option<CatalogProcedure>> {
        Ok(self.backend.procedures.get(name).cloned())
    }

    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.backend.log().closed = true;
        Ok(())
    }
}

struct MockCall {
    script: MockCallScript,
    log: Arc<Mutex<MockLog>>,
    flavor: ReturnFlavor,
    cursor: Option<Box<dyn Cursor>>,
}

#[async_trait]
impl CallHandle for MockCall {
    fn set(&mut self, index: usize, value: SqlValue) -> Result<()> {
        self.log.lock().expect("mock log poisoned").bound.push((index, value));
        Ok(())
    }

    fn register_out(&mut self, index: usize, _sql_type: &SqlType) -> Result<()> {
        self.log.lock().expect("mock log poisoned").registered.push(index);
        Ok(())
    }

    async fn execute(&mut self) -> Result<()> {
        if self.script.fail {
            return Err(DbError::Driver("procedure raised an exception".into()));
        }
        if let Some(rows) = self.script.cursor_rows.clone() {
            if self.flavor != ReturnFlavor::Void {
                self.cursor = Some(Box::new(VecCursor::new(rows, CursorKind::ScrollInsensitive)));
            }
        }
        Ok(())
    }

    fn get(&self, index: usize) -> Result<SqlValue> {
        self.script
            .outputs
            .get(&index)
            .cloned()
            .ok_or_else(|| DbError::Driver(format!("slot {} was not registered", index)))
    }

    fn take_cursor(&mut self) -> Option<Box<dyn Cursor>> {
        self.cursor.take()
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().expect("mock log poisoned").calls_closed += 1;
        if self.script.fail_close {
            return Err(DbError::Driver("close failed".into()));
        }
        Ok(())
    }
}

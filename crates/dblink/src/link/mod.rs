//! The data link: a lazily connected, single-connection executor.
//!
//! A [`DataLink`] owns at most one live backend connection, opened on first
//! use. Before each operation it consults the backend's [`Capabilities`] and
//! emulates what is missing:
//!
//! - no native OFFSET/LIMIT: fetch `offset + limit` rows and skip in memory
//! - no generated keys (or a rejected keyed execution): re-run plainly
//! - no scroll-sensitive cursors: open scroll-insensitive instead
//!
//! These substitutions are logged at debug level and never reported as
//! errors. Real failures carry the link's data source name.

mod transaction;

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::procedure::CallBuilder;
use crate::core::traits::{Capabilities, Connection, Cursor, CursorKind, Driver, QueryOptions, Rowset};
use crate::core::value::SqlValue;
use crate::error::{DbError, Result};
use crate::procedure::{self, CallResult};

/// Savepoint fencing a generated-keys attempt inside a transaction.
const KEYS_SAVEPOINT: &str = "dblink_generated_keys";

/// Row window requested for a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryBounds {
    /// Rows to skip.
    pub offset: u64,
    /// Rows to return; `None` for all.
    pub limit: Option<u64>,
}

impl QueryBounds {
    /// Every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// `limit` rows after skipping `offset`.
    pub fn window(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    fn is_unbounded(&self) -> bool {
        self.offset == 0 && self.limit.is_none()
    }
}

/// Result of [`DataLink::write`].
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// Rows affected.
    pub affected: u64,
    /// Generated keys, when requested and the backend returned them.
    pub generated_keys: Option<Rowset>,
}

/// Lazily connected executor for one data source.
pub struct DataLink {
    name: String,
    driver: Arc<dyn Driver>,
    conn: Option<Box<dyn Connection>>,
}

impl DataLink {
    /// Create a link; no connection is made until the first operation.
    pub fn new(name: impl Into<String>, driver: Arc<dyn Driver>) -> Self {
        Self {
            name: name.into(),
            driver,
            conn: None,
        }
    }

    /// Data source name attached to errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a backend connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// The live connection, connecting first if needed.
    pub(crate) async fn connection(&mut self) -> Result<&mut Box<dyn Connection>> {
        if self.conn.is_none() {
            debug!("{}: connecting through {} driver", self.name, self.driver.name());
            let conn = self.driver.connect().await.map_err(|e| match e {
                e @ DbError::Connection { .. } => e,
                other => DbError::connection(self.name.clone(), other.to_string()),
            })?;
            info!("{}: connected", self.name);
            self.conn = Some(conn);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::connection(self.name.clone(), "connection unavailable"))
    }

    /// Backend capability flags (connects if needed).
    pub async fn capabilities(&mut self) -> Result<Capabilities> {
        Ok(self.connection().await?.capabilities())
    }

    /// Run a query and materialize the rows inside `bounds`.
    pub async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        bounds: QueryBounds,
    ) -> Result<Rowset> {
        let result = self.query_inner(sql, params, bounds).await;
        result.map_err(|e| e.on_source(&self.name))
    }

    async fn query_inner(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        bounds: QueryBounds,
    ) -> Result<Rowset> {
        let name = self.name.clone();
        let conn = self.connection().await?;
        if bounds.is_unbounded() {
            return conn.query(sql, params, &QueryOptions::default()).await;
        }

        if conn.capabilities().native_offset {
            let opts = QueryOptions {
                offset: Some(bounds.offset).filter(|o| *o > 0),
                limit: bounds.limit,
                max_rows: None,
            };
            return conn.query(sql, params, &opts).await;
        }

        let max_rows = bounds.limit.map(|limit| bounds.offset.saturating_add(limit));
        debug!(
            "{}: backend has no native offset; fetching up to {:?} rows and skipping {} in memory",
            name, max_rows, bounds.offset
        );
        let opts = QueryOptions {
            offset: None,
            limit: None,
            max_rows,
        };
        let mut rowset = conn.query(sql, params, &opts).await?;
        let skip = (bounds.offset as usize).min(rowset.rows.len());
        rowset.rows.drain(..skip);
        if let Some(limit) = bounds.limit {
            rowset.rows.truncate(limit as usize);
        }
        Ok(rowset)
    }

    /// Execute a write, optionally asking for generated keys.
    ///
    /// When the backend cannot return keys, or rejects the keyed execution,
    /// the statement runs plainly and `generated_keys` is `None`.
    pub async fn write(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        want_generated_keys: bool,
    ) -> Result<WriteOutcome> {
        let result = self.write_inner(sql, params, want_generated_keys).await;
        result.map_err(|e| e.on_source(&self.name))
    }

    async fn write_inner(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        want_generated_keys: bool,
    ) -> Result<WriteOutcome> {
        let name = self.name.clone();
        let conn = self.connection().await?;
        let caps = conn.capabilities();

        if want_generated_keys {
            let in_tx = conn.in_transaction();
            if !caps.generated_keys {
                debug!("{}: backend cannot return generated keys; executing plainly", name);
            } else if in_tx && !caps.savepoints {
                debug!(
                    "{}: no savepoints to fence a keyed attempt inside the transaction; executing plainly",
                    name
                );
            } else {
                if in_tx {
                    conn.savepoint(KEYS_SAVEPOINT).await?;
                }
                match conn.execute_returning_keys(sql, params).await {
                    Ok((affected, keys)) => {
                        if in_tx {
                            conn.release_savepoint(KEYS_SAVEPOINT).await?;
                        }
                        return Ok(WriteOutcome {
                            affected,
                            generated_keys: Some(keys),
                        });
                    }
                    Err(e) => {
                        debug!(
                            "{}: keyed execution rejected ({}); retrying without generated keys",
                            name, e
                        );
                        if in_tx {
                            conn.rollback_to(KEYS_SAVEPOINT).await?;
                        }
                    }
                }
            }
        }

        let affected = conn.execute(sql, params).await?;
        Ok(WriteOutcome {
            affected,
            generated_keys: None,
        })
    }

    /// Open a live cursor, downgrading the kind to what the backend supports.
    pub async fn open_cursor(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        kind: CursorKind,
    ) -> Result<Box<dyn Cursor>> {
        let result = self.open_cursor_inner(sql, params, kind).await;
        result.map_err(|e| e.on_source(&self.name))
    }

    async fn open_cursor_inner(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        kind: CursorKind,
    ) -> Result<Box<dyn Cursor>> {
        let name = self.name.clone();
        let conn = self.connection().await?;
        let caps = conn.capabilities();

        let mut effective = kind;
        if effective == CursorKind::ScrollSensitive && !caps.sensitive_scroll {
            debug!("{}: scroll-sensitive cursor unsupported; using scroll-insensitive", name);
            effective = CursorKind::ScrollInsensitive;
        }
        if effective.is_scrollable() && !caps.scroll_cursors {
            debug!("{}: scrollable cursors unsupported; using forward-only", name);
            effective = CursorKind::ForwardOnly;
        }
        conn.open_cursor(sql, params, effective).await
    }

    /// Invoke a stored procedure; output values are written back into it.
    pub async fn call(&mut self, call: CallBuilder<'_>) -> Result<CallResult> {
        let (procedure, values) = call.into_parts();
        let result = match self.connection().await {
            Ok(conn) => procedure::invoke(&mut **conn, procedure, values).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| e.on_source(&self.name))
    }

    /// Cheap liveness check.
    pub async fn ping(&mut self) -> Result<()> {
        let result = match self.connection().await {
            Ok(conn) => conn.ping().await,
            Err(e) => Err(e),
        };
        result.map_err(|e| e.on_source(&self.name))
    }

    /// Close the backend connection, if one is open.
    ///
    /// The link can be used again afterwards; it reconnects lazily.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut conn) = self.conn.take() {
            if conn.in_transaction() {
                if let Err(e) = conn.rollback().await {
                    debug!("{}: rollback before close failed: {}", self.name, e);
                }
            }
            conn.close().await.map_err(|e| e.on_source(&self.name))?;
            info!("{}: connection closed", self.name);
        }
        Ok(())
    }
}

impl std::fmt::Debug for DataLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLink")
            .field("name", &self.name)
            .field("driver", &self.driver.name())
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

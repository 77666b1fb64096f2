//! Server-side cursors (`DECLARE ... CURSOR WITH HOLD`).

use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::Client;
use tracing::debug;

use crate::core::schema::ColumnMeta;
use crate::core::traits::{Cursor, CursorKind};
use crate::core::value::{Row, SqlValue};
use crate::error::{DbError, Result};

use super::types::{column_meta, decode_row, params};

/// A named server-side cursor.
///
/// Declared `WITH HOLD` so it survives the end of the implicit transaction
/// in auto-commit mode. Closed explicitly, or in the background on drop.
pub struct PgCursor {
    client: Arc<Client>,
    name: String,
    columns: Vec<ColumnMeta>,
    kind: CursorKind,
    position: i64,
    total: Option<i64>,
    closed: bool,
}

impl PgCursor {
    /// Declare cursor `name` over `sql`.
    pub(crate) async fn declare(
        client: Arc<Client>,
        name: String,
        sql: &str,
        values: &[SqlValue],
        kind: CursorKind,
    ) -> Result<Self> {
        let statement = client.prepare(sql).await?;
        let columns = statement.columns().iter().map(column_meta).collect();

        let scroll = if kind.is_scrollable() {
            "SCROLL"
        } else {
            "NO SCROLL"
        };
        let declare = format!("DECLARE {} {} CURSOR WITH HOLD FOR {}", name, scroll, sql);
        client.execute(declare.as_str(), &params(values)).await?;
        debug!("Declared {} cursor {}", scroll, name);

        Ok(Self {
            client,
            name,
            columns,
            kind,
            position: 0,
            total: None,
            closed: false,
        })
    }

    fn require_scroll(&self) -> Result<()> {
        if self.kind.is_scrollable() {
            Ok(())
        } else {
            Err(DbError::Driver(format!("cursor {} is forward-only", self.name)))
        }
    }

    async fn fetch_rows(&mut self, direction: &str) -> Result<Vec<Row>> {
        let sql = format!("FETCH {} FROM {}", direction, self.name);
        let rows = self.client.query(sql.as_str(), &[]).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn move_to(&mut self, direction: &str) -> Result<u64> {
        let sql = format!("MOVE {} IN {}", direction, self.name);
        Ok(self.client.execute(sql.as_str(), &[]).await?)
    }
}

#[async_trait]
impl Cursor for PgCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn kind(&self) -> CursorKind {
        self.kind
    }

    fn position(&self) -> i64 {
        self.position
    }

    async fn absolute(&mut self, row: i64) -> Result<bool> {
        self.require_scroll()?;
        let moved = self.move_to(&format!("ABSOLUTE {}", row)).await?;
        self.position = match (row >= 0, self.total) {
            (true, Some(total)) => row.min(total + 1),
            (true, None) => row,
            (false, Some(total)) => (total + 1 + row).max(0),
            (false, None) => 0,
        };
        Ok(moved > 0)
    }

    async fn next(&mut self) -> Result<Option<Row>> {
        let row = self.fetch_rows("NEXT").await?.into_iter().next();
        if row.is_some() {
            self.position += 1;
        } else {
            let total = *self.total.get_or_insert(self.position);
            self.position = total + 1;
        }
        Ok(row)
    }

    async fn previous(&mut self) -> Result<Option<Row>> {
        self.require_scroll()?;
        let row = self.fetch_rows("PRIOR").await?.into_iter().next();
        self.position = (self.position - 1).max(0);
        Ok(row)
    }

    async fn fetch(&mut self, count: usize) -> Result<Vec<Row>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let rows = self.fetch_rows(&format!("FORWARD {}", count)).await?;
        self.position += rows.len() as i64;
        if rows.len() < count {
            let total = *self.total.get_or_insert(self.position);
            self.position = total + 1;
        }
        Ok(rows)
    }

    async fn last(&mut self) -> Result<i64> {
        self.require_scroll()?;
        self.move_to("ABSOLUTE 0").await?;
        let total = self.move_to("FORWARD ALL").await? as i64;
        self.move_to(&format!("ABSOLUTE {}", total)).await?;
        self.total = Some(total);
        self.position = total;
        Ok(total)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.client
            .batch_execute(&format!("CLOSE {}", self.name))
            .await?;
        Ok(())
    }
}

impl Drop for PgCursor {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = Arc::clone(&self.client);
            let sql = format!("CLOSE {}", self.name);
            handle.spawn(async move {
                if let Err(e) = client.batch_execute(&sql).await {
                    debug!("Background {} failed: {}", sql, e);
                }
            });
        }
    }
}

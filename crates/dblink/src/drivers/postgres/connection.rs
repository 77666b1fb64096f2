//! A single PostgreSQL client session.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

use crate::config::DataSourceConfig;
use crate::core::identifier::quote_pg;
use crate::core::procedure::ReturnFlavor;
use crate::core::traits::{
    CallHandle, Capabilities, CatalogColumn, CatalogIndexColumn, CatalogKeyColumn,
    CatalogProcedure, CatalogTable, Connection, Cursor, CursorKind, QueryOptions, Rowset,
};
use crate::core::value::SqlValue;
use crate::error::{DbError, Result};

use super::call::PgCall;
use super::catalog;
use super::cursor::PgCursor;
use super::tls::{connector, SslMode};
use super::types::{column_meta, decode_row, params};

/// Connected PostgreSQL session.
pub struct PgConnection {
    client: Arc<Client>,
    in_tx: bool,
    cursor_seq: u64,
}

impl PgConnection {
    /// Connect using the data source settings.
    ///
    /// The connection future runs on its own task; it ends when the client
    /// is dropped.
    pub async fn connect(config: &DataSourceConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port());
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("dblink");

        let mode = SslMode::parse(&config.ssl_mode)?;
        let client = match mode {
            SslMode::Disable => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Self::connect_plain(&pg_config, config).await?
            }
            SslMode::Prefer => match Self::connect_tls(&pg_config, config, mode).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(
                        "TLS connection to {} failed ({}); retrying without TLS",
                        config.host, e
                    );
                    Self::connect_plain(&pg_config, config).await?
                }
            },
            _ => Self::connect_tls(&pg_config, config, mode).await?,
        };

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host,
            config.port(),
            config.database
        );

        Ok(Self {
            client: Arc::new(client),
            in_tx: false,
            cursor_seq: 0,
        })
    }

    async fn connect_plain(pg_config: &PgConfig, config: &DataSourceConfig) -> Result<Client> {
        let (client, connection) = pg_config
            .connect(NoTls)
            .await
            .map_err(|e| DbError::connection(&config.name, e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection closed with error: {}", e);
            }
        });
        Ok(client)
    }

    async fn connect_tls(
        pg_config: &PgConfig,
        config: &DataSourceConfig,
        mode: SslMode,
    ) -> Result<Client> {
        let Some(tls) = connector(mode)? else {
            return Self::connect_plain(pg_config, config).await;
        };
        let (client, connection) = pg_config
            .connect(tls)
            .await
            .map_err(|e| DbError::connection(&config.name, e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection closed with error: {}", e);
            }
        });
        Ok(client)
    }

    fn next_cursor_name(&mut self) -> String {
        self.cursor_seq += 1;
        format!("dblink_cursor_{}", self.cursor_seq)
    }
}

/// Wrap `sql` so the server applies the window.
fn windowed(sql: &str, opts: &QueryOptions) -> String {
    let limit = opts.limit.or(opts.max_rows);
    if limit.is_none() && opts.offset.is_none() {
        return sql.to_string();
    }
    let mut wrapped = format!("SELECT * FROM ({}) AS _q", strip_terminator(sql));
    if let Some(limit) = limit {
        wrapped.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = opts.offset {
        wrapped.push_str(&format!(" OFFSET {}", offset));
    }
    wrapped
}

fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

#[async_trait]
impl Connection for PgConnection {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_offset: true,
            generated_keys: true,
            scroll_cursors: true,
            sensitive_scroll: false,
            savepoints: true,
            case_sensitive_identifiers: true,
        }
    }

    async fn query(
        &mut self,
        sql: &str,
        values: &[SqlValue],
        opts: &QueryOptions,
    ) -> Result<Rowset> {
        let sql = windowed(sql, opts);
        let statement = self.client.prepare(&sql).await?;
        let columns = statement.columns().iter().map(column_meta).collect();
        let rows = self.client.query(&statement, &params(values)).await?;
        Ok(Rowset::new(columns, rows.iter().map(decode_row).collect()))
    }

    async fn open_cursor(
        &mut self,
        sql: &str,
        values: &[SqlValue],
        kind: CursorKind,
    ) -> Result<Box<dyn Cursor>> {
        if kind == CursorKind::ScrollSensitive {
            return Err(DbError::Driver(
                "PostgreSQL cursors cannot see concurrent changes".into(),
            ));
        }
        let name = self.next_cursor_name();
        let cursor = PgCursor::declare(
            Arc::clone(&self.client),
            name,
            strip_terminator(sql),
            values,
            kind,
        )
        .await?;
        Ok(Box::new(cursor))
    }

    async fn execute(&mut self, sql: &str, values: &[SqlValue]) -> Result<u64> {
        Ok(self.client.execute(sql, &params(values)).await?)
    }

    async fn execute_returning_keys(
        &mut self,
        sql: &str,
        values: &[SqlValue],
    ) -> Result<(u64, Rowset)> {
        let sql = format!("{} RETURNING *", strip_terminator(sql));
        let statement = self.client.prepare(&sql).await?;
        let columns = statement.columns().iter().map(column_meta).collect();
        let rows = self.client.query(&statement, &params(values)).await?;
        let keys = Rowset::new(columns, rows.iter().map(decode_row).collect());
        Ok((keys.len() as u64, keys))
    }

    async fn prepare_call(
        &mut self,
        call_text: &str,
        flavor: ReturnFlavor,
    ) -> Result<Box<dyn CallHandle>> {
        let cursor_name = self.next_cursor_name();
        let call = PgCall::new(Arc::clone(&self.client), call_text, flavor, cursor_name)?;
        Ok(Box::new(call))
    }

    async fn begin(&mut self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        self.in_tx = true;
        debug!("Transaction started");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        self.in_tx = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let result = self.client.batch_execute("ROLLBACK").await;
        self.in_tx = false;
        Ok(result?)
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }

    async fn savepoint(&mut self, name: &str) -> Result<()> {
        self.client
            .batch_execute(&format!("SAVEPOINT {}", quote_pg(name)?))
            .await?;
        Ok(())
    }

    async fn rollback_to(&mut self, name: &str) -> Result<()> {
        self.client
            .batch_execute(&format!("ROLLBACK TO SAVEPOINT {}", quote_pg(name)?))
            .await?;
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.client
            .batch_execute(&format!("RELEASE SAVEPOINT {}", quote_pg(name)?))
            .await?;
        Ok(())
    }

    async fn catalog_tables(&mut self, schema: &str) -> Result<Vec<CatalogTable>> {
        catalog::tables(&self.client, schema).await
    }

    async fn catalog_columns(&mut self, schema: &str, table: &str) -> Result<Vec<CatalogColumn>> {
        catalog::columns(&self.client, schema, table).await
    }

    async fn catalog_primary_key(&mut self, schema: &str, table: &str) -> Result<Vec<String>> {
        catalog::primary_key(&self.client, schema, table).await
    }

    async fn catalog_indexes(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<CatalogIndexColumn>> {
        catalog::indexes(&self.client, schema, table).await
    }

    async fn catalog_exported_keys(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<CatalogKeyColumn>> {
        catalog::exported_keys(&self.client, schema, table).await
    }

    async fn catalog_procedure(
        &mut self,
        schema: &str,
        name: &str,
    ) -> Result<Option<CatalogProcedure>> {
        catalog::procedure(&self.client, schema, name).await
    }

    async fn ping(&mut self) -> Result<()> {
        self.client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.in_tx {
            warn!("Closing connection with an open transaction; rolling back");
            self.rollback().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windowed_wraps_with_limit_and_offset() {
        let opts = QueryOptions {
            offset: Some(20),
            limit: Some(10),
            max_rows: None,
        };
        assert_eq!(
            windowed("SELECT id FROM t ORDER BY id;", &opts),
            "SELECT * FROM (SELECT id FROM t ORDER BY id) AS _q LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_windowed_passes_unbounded_through() {
        assert_eq!(
            windowed("SELECT 1", &QueryOptions::default()),
            "SELECT 1"
        );
    }

    #[test]
    fn test_windowed_uses_max_rows_as_limit() {
        let opts = QueryOptions {
            offset: None,
            limit: None,
            max_rows: Some(5),
        };
        assert_eq!(windowed("SELECT 1", &opts), "SELECT * FROM (SELECT 1) AS _q LIMIT 5");
    }
}

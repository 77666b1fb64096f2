//! PostgreSQL driver.
//!
//! - [`PostgresDriver`]: opens [`PgConnection`]s for one data source
//! - [`PgCursor`]: `DECLARE ... CURSOR WITH HOLD` server-side cursors
//! - [`PgCall`]: `{call ...}` text translated to `SELECT`/`CALL`
//!
//! TLS follows the data source's `ssl_mode` (see [`SslMode`]).

mod call;
mod catalog;
mod connection;
mod cursor;
mod tls;
mod types;

pub use call::PgCall;
pub use connection::PgConnection;
pub use cursor::PgCursor;
pub use tls::SslMode;

use async_trait::async_trait;

use crate::config::DataSourceConfig;
use crate::core::traits::{Connection, Driver};
use crate::error::Result;

/// Driver for one PostgreSQL data source.
#[derive(Debug, Clone)]
pub struct PostgresDriver {
    config: DataSourceConfig,
}

impl PostgresDriver {
    pub fn new(config: DataSourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn = PgConnection::connect(&self.config).await?;
        Ok(Box::new(conn))
    }
}

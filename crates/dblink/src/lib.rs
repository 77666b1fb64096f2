//! # dblink
//!
//! Capability-aware database link library.
//!
//! A [`DataLink`] wraps one backend connection and hides what the backend
//! cannot do natively: row windows without `OFFSET`, generated keys,
//! savepoint-less transactions. On top of it sit:
//!
//! - **Schema introspection** ([`schema::Introspector`]) and **schema
//!   migration** ([`schema::Migrator`]) rendered through a per-backend
//!   [`dialect::SchemaDialect`]
//! - **Paging** over scrollable cursors ([`paging::Scroller`]), with an LRU
//!   page cache ([`paging::CachedScroller`]) or an offset/limit
//!   [`paging::Pager`]
//! - **Stored procedure calls** ([`procedure::invoke`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use dblink::{Config, DriverCatalog, QueryBounds};
//!
//! #[tokio::main]
//! async fn main() -> dblink::Result<()> {
//!     let config = Config::load("dblink.yaml")?;
//!     let catalog = DriverCatalog::with_builtins();
//!     let mut link = catalog.create_link(&config.data_source)?;
//!     let rows = link
//!         .query("SELECT id FROM users ORDER BY id", &[], QueryBounds::window(20, 10))
//!         .await?;
//!     println!("{} rows", rows.len());
//!     link.close().await
//! }
//! ```

pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod link;
pub mod paging;
pub mod procedure;
pub mod schema;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use crate::config::{Config, DataSourceConfig, PagingConfig, SchemaConfig};
pub use crate::core::{
    Capabilities, Column, CursorKind, DriverCatalog, Index, Procedure, ReturnFlavor, Rowset,
    SqlType, SqlValue, Table, TableChange, TableInfo, TableKind,
};
pub use crate::dialect::{DialectImpl, SchemaDialect};
pub use crate::error::{DbError, Result};
pub use crate::link::{DataLink, QueryBounds, WriteOutcome};
pub use crate::paging::{CachedScroller, Page, Pager, Scroller};
pub use crate::procedure::CallResult;
pub use crate::schema::{ChangeSet, DescribeOptions, Introspector, Migrator, SyncReport};

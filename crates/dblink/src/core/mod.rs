//! Core abstractions shared by the link, the paging layer and the drivers.
//!
//! - [`schema`]: table, column and index descriptors
//! - [`value`]: SQL value representation
//! - [`procedure`]: stored procedure descriptors and call binding
//! - [`traits`]: backend client traits and capability flags
//! - [`identifier`]: identifier validation and quoting
//! - [`catalog`]: driver and dialect registry
//!
//! Drivers (`drivers/postgres`) implement the traits; everything else
//! depends only on this module.

pub mod catalog;
pub mod identifier;
pub mod procedure;
pub mod schema;
pub mod traits;
pub mod value;

pub use catalog::{DriverCatalog, DriverFactory};
pub use procedure::{CallBuilder, ParamDirection, Procedure, ProcedureParam, ReturnFlavor};
pub use schema::{
    Column, ColumnDefault, ColumnMeta, Index, IndexKind, Relationship, SqlType, Table,
    TableChange, TableInfo, TableKind,
};
pub use traits::{CallHandle, Capabilities, Connection, Cursor, CursorKind, Driver, Rowset};
pub use value::{Row, SqlValue};

//! Schema introspection and synchronization.
//!
//! [`Introspector`] reads table descriptors from a live connection;
//! [`diff_tables`] classifies the differences between a desired and an
//! existing descriptor into [`SchemaOp`]s; [`Migrator`] renders those through
//! a [`SchemaDialect`](crate::dialect::SchemaDialect) and executes them.

mod diff;
mod introspect;

pub use diff::{diff_change, diff_tables, Migrator, SchemaOp, SyncReport, TableDiff};
pub use introspect::{ChangeSet, DescribeOptions, DescribeReport, Introspector};

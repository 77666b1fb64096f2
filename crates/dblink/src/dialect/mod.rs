//! Schema dialects: backend-specific DDL text for the schema differ.
//!
//! The differ only classifies and sequences [`SchemaOp`](crate::schema::SchemaOp)
//! values; a [`SchemaDialect`] turns each operation into one or more
//! statements for its backend.
//!
//! - [`PostgresDialect`]: PostgreSQL
//! - [`MssqlDialect`]: Microsoft SQL Server
//! - [`MysqlDialect`]: MySQL / MariaDB
//!
//! [`DialectImpl`] selects a built-in dialect from a database type string.

mod mssql;
mod mysql;
mod postgres;

pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;

use crate::core::schema::{Column, Index, IndexKind, Table};
use crate::error::{DbError, Result};

/// DDL strategy for one backend.
///
/// Every method returns the statements to run, in order. Names are quoted
/// through [`quote_ident`](SchemaDialect::quote_ident), which rejects
/// identifiers that cannot be spliced safely.
pub trait SchemaDialect: Send + Sync {
    /// Dialect identifier (e.g. "postgres").
    fn name(&self) -> &str;

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Schema-qualified, quoted table name.
    fn qualify(&self, table: &Table) -> Result<String> {
        if table.schema.is_empty() {
            self.quote_ident(&table.name)
        } else {
            Ok(format!(
                "{}.{}",
                self.quote_ident(&table.schema)?,
                self.quote_ident(&table.name)?
            ))
        }
    }

    /// Native type spelling for a column.
    fn column_type(&self, column: &Column) -> String;

    /// Full column definition: name, type, identity, default and nullability.
    fn column_definition(&self, column: &Column) -> Result<String>;

    /// Create a table with its primary key and indices.
    fn create_table(&self, table: &Table) -> Result<Vec<String>> {
        let mut defs = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect::<Result<Vec<_>>>()?;

        if let Some(pk) = table.primary_key() {
            defs.push(self.primary_key_clause(table, pk)?);
        }

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.qualify(table)?,
            defs.join(",\n    ")
        )];
        for index in table.indexes.iter().filter(|i| !i.is_primary()) {
            statements.extend(self.create_index(table, index)?);
        }
        Ok(statements)
    }

    /// Inline primary key clause of `CREATE TABLE`.
    fn primary_key_clause(&self, _table: &Table, pk: &Index) -> Result<String> {
        Ok(format!("PRIMARY KEY ({})", self.column_list(&pk.columns)?))
    }

    /// Add a column. `prev`/`next` are its neighbors in the desired order.
    fn add_column(
        &self,
        table: &Table,
        column: &Column,
        prev: Option<&Column>,
        next: Option<&Column>,
    ) -> Result<Vec<String>>;

    /// Change an existing column's definition from `old` to `new`.
    fn alter_column(&self, table: &Table, new: &Column, old: &Column) -> Result<Vec<String>>;

    /// Drop a column.
    fn drop_column(&self, table: &Table, column: &Column) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.qualify(table)?,
            self.quote_ident(&column.name)?
        )])
    }

    /// Create an index, or add the primary key constraint.
    fn create_index(&self, table: &Table, index: &Index) -> Result<Vec<String>>;

    /// Drop an index, or the primary key constraint.
    fn drop_index(&self, table: &Table, index: &Index) -> Result<Vec<String>>;

    /// Comma-separated quoted column names.
    fn column_list(&self, columns: &[String]) -> Result<String> {
        Ok(columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }
}

/// `CREATE [UNIQUE] INDEX name ON table (cols)`, shared by all dialects.
pub(crate) fn create_plain_index(
    dialect: &dyn SchemaDialect,
    table: &Table,
    index: &Index,
) -> Result<String> {
    let unique = if index.kind == IndexKind::Unique {
        "UNIQUE "
    } else {
        ""
    };
    Ok(format!(
        "CREATE {}INDEX {} ON {} ({})",
        unique,
        dialect.quote_ident(&index.name)?,
        dialect.qualify(table)?,
        dialect.column_list(&index.columns)?
    ))
}

/// Length suffix for sized types: `(n)` or `(p,s)`.
pub(crate) fn size_suffix(column: &Column) -> Option<String> {
    match (column.length, column.scale) {
        (l, _) if l <= 0 => None,
        (l, 0) => Some(format!("({})", l)),
        (l, s) => Some(format!("({},{})", l, s)),
    }
}

/// Enum-based static dispatch for the built-in dialects.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Postgres(PostgresDialect),
    Mssql(MssqlDialect),
    Mysql(MysqlDialect),
}

impl DialectImpl {
    /// Create a dialect from a database type string.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        match db_type.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectImpl::Postgres(PostgresDialect::new())),
            "mssql" | "sqlserver" | "sql_server" => Ok(DialectImpl::Mssql(MssqlDialect::new())),
            "mysql" | "mariadb" => Ok(DialectImpl::Mysql(MysqlDialect::new())),
            other => Err(DbError::Config(format!(
                "Unknown schema dialect: '{}'. Supported dialects: postgres, mssql, mysql",
                other
            ))),
        }
    }

    fn inner(&self) -> &dyn SchemaDialect {
        match self {
            DialectImpl::Postgres(d) => d,
            DialectImpl::Mssql(d) => d,
            DialectImpl::Mysql(d) => d,
        }
    }
}

impl SchemaDialect for DialectImpl {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        self.inner().quote_ident(name)
    }

    fn qualify(&self, table: &Table) -> Result<String> {
        self.inner().qualify(table)
    }

    fn column_type(&self, column: &Column) -> String {
        self.inner().column_type(column)
    }

    fn column_definition(&self, column: &Column) -> Result<String> {
        self.inner().column_definition(column)
    }

    fn create_table(&self, table: &Table) -> Result<Vec<String>> {
        self.inner().create_table(table)
    }

    fn primary_key_clause(&self, table: &Table, pk: &Index) -> Result<String> {
        self.inner().primary_key_clause(table, pk)
    }

    fn add_column(
        &self,
        table: &Table,
        column: &Column,
        prev: Option<&Column>,
        next: Option<&Column>,
    ) -> Result<Vec<String>> {
        self.inner().add_column(table, column, prev, next)
    }

    fn alter_column(&self, table: &Table, new: &Column, old: &Column) -> Result<Vec<String>> {
        self.inner().alter_column(table, new, old)
    }

    fn drop_column(&self, table: &Table, column: &Column) -> Result<Vec<String>> {
        self.inner().drop_column(table, column)
    }

    fn create_index(&self, table: &Table, index: &Index) -> Result<Vec<String>> {
        self.inner().create_index(table, index)
    }

    fn drop_index(&self, table: &Table, index: &Index) -> Result<Vec<String>> {
        self.inner().drop_index(table, index)
    }
}

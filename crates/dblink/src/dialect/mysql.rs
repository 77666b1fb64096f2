//! MySQL / MariaDB DDL.
//!
//! MySQL keeps physical column order, so added columns are placed with
//! `AFTER <prev>` (or `FIRST`) to match the desired layout.

use crate::core::identifier::quote_mysql;
use crate::core::schema::{Column, Index, SqlType, Table};
use crate::error::Result;

use super::{create_plain_index, size_suffix, SchemaDialect};

/// MySQL schema dialect.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl SchemaDialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn column_type(&self, column: &Column) -> String {
        match &column.sql_type {
            SqlType::Boolean => "tinyint(1)".to_string(),
            SqlType::SmallInt => "smallint".to_string(),
            SqlType::Integer => "int".to_string(),
            SqlType::BigInt => "bigint".to_string(),
            SqlType::Real => "float".to_string(),
            SqlType::Double => "double".to_string(),
            SqlType::Decimal => match size_suffix(column) {
                Some(size) => format!("decimal{}", size),
                None => "decimal(10,0)".to_string(),
            },
            SqlType::Char => match size_suffix(column) {
                Some(size) => format!("char{}", size),
                None => "char(1)".to_string(),
            },
            SqlType::Varchar => match size_suffix(column) {
                Some(size) if column.length <= 16383 => format!("varchar{}", size),
                _ => "longtext".to_string(),
            },
            SqlType::Text => "longtext".to_string(),
            SqlType::Binary => match size_suffix(column) {
                Some(size) => format!("varbinary{}", size),
                None => "longblob".to_string(),
            },
            SqlType::Blob => "longblob".to_string(),
            SqlType::Date => "date".to_string(),
            SqlType::Time => "time".to_string(),
            SqlType::Timestamp => "datetime(6)".to_string(),
            SqlType::TimestampTz => "timestamp(6)".to_string(),
            SqlType::Uuid => "char(36)".to_string(),
            SqlType::Json => "json".to_string(),
            SqlType::Other(name) => name.clone(),
        }
    }

    fn column_definition(&self, column: &Column) -> Result<String> {
        let mut def = format!("{} {}", self.quote_ident(&column.name)?, self.column_type(column));
        def.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if column.auto_increment {
            def.push_str(" AUTO_INCREMENT");
        } else if let Some(default) = &column.default {
            def.push_str(" DEFAULT ");
            def.push_str(&default.to_sql());
        }
        Ok(def)
    }

    fn add_column(
        &self,
        table: &Table,
        column: &Column,
        prev: Option<&Column>,
        _next: Option<&Column>,
    ) -> Result<Vec<String>> {
        let position = match prev {
            Some(prev) => format!(" AFTER {}", self.quote_ident(&prev.name)?),
            None => " FIRST".to_string(),
        };
        Ok(vec![format!(
            "ALTER TABLE {} ADD COLUMN {}{}",
            self.qualify(table)?,
            self.column_definition(column)?,
            position
        )])
    }

    fn alter_column(&self, table: &Table, new: &Column, _old: &Column) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            self.qualify(table)?,
            self.column_definition(new)?
        )])
    }

    fn create_index(&self, table: &Table, index: &Index) -> Result<Vec<String>> {
        if index.is_primary() {
            return Ok(vec![format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                self.qualify(table)?,
                self.column_list(&index.columns)?
            )]);
        }
        Ok(vec![create_plain_index(self, table, index)?])
    }

    fn drop_index(&self, table: &Table, index: &Index) -> Result<Vec<String>> {
        if index.is_primary() {
            return Ok(vec![format!(
                "ALTER TABLE {} DROP PRIMARY KEY",
                self.qualify(table)?
            )]);
        }
        Ok(vec![format!(
            "DROP INDEX {} ON {}",
            self.quote_ident(&index.name)?,
            self.qualify(table)?
        )])
    }
}

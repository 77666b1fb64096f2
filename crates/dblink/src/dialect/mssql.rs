//! SQL Server DDL.
//!
//! Defaults are named constraints (`DF_<table>_<column>`) and the primary
//! key is `PK_<table>`, so both can be dropped later without a catalog
//! lookup.

use tracing::warn;

use crate::core::identifier::quote_mssql;
use crate::core::schema::{Column, ColumnDefault, Index, SqlType, Table};
use crate::core::value::SqlValue;
use crate::error::Result;

use super::{create_plain_index, size_suffix, SchemaDialect};

/// Microsoft SQL Server schema dialect.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new SQL Server dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn pk_constraint(table: &Table) -> String {
        format!("PK_{}", table.name)
    }

    fn default_constraint(table: &str, column: &str) -> String {
        format!("DF_{}_{}", table, column)
    }

    fn default_sql(default: &ColumnDefault) -> String {
        match default {
            ColumnDefault::Literal(SqlValue::Bool(b)) => if *b { "1" } else { "0" }.to_string(),
            ColumnDefault::Literal(SqlValue::Text(s)) => format!("N'{}'", s.replace('\'', "''")),
            other => other.to_sql(),
        }
    }

    fn type_and_null(&self, column: &Column) -> String {
        let null = if column.nullable { "NULL" } else { "NOT NULL" };
        format!("{} {}", self.column_type(column), null)
    }
}

impl SchemaDialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mssql(name)
    }

    fn column_type(&self, column: &Column) -> String {
        match &column.sql_type {
            SqlType::Boolean => "bit".to_string(),
            SqlType::SmallInt => "smallint".to_string(),
            SqlType::Integer => "int".to_string(),
            SqlType::BigInt => "bigint".to_string(),
            SqlType::Real => "real".to_string(),
            SqlType::Double => "float".to_string(),
            SqlType::Decimal => match size_suffix(column) {
                Some(size) => format!("decimal{}", size),
                None => "decimal(18,0)".to_string(),
            },
            SqlType::Char => match size_suffix(column) {
                Some(size) => format!("nchar{}", size),
                None => "nchar(1)".to_string(),
            },
            SqlType::Varchar => match size_suffix(column) {
                Some(size) if column.length <= 4000 => format!("nvarchar{}", size),
                _ => "nvarchar(max)".to_string(),
            },
            SqlType::Text | SqlType::Json => "nvarchar(max)".to_string(),
            SqlType::Binary => match size_suffix(column) {
                Some(size) if column.length <= 8000 => format!("varbinary{}", size),
                _ => "varbinary(max)".to_string(),
            },
            SqlType::Blob => "varbinary(max)".to_string(),
            SqlType::Date => "date".to_string(),
            SqlType::Time => "time".to_string(),
            SqlType::Timestamp => "datetime2".to_string(),
            SqlType::TimestampTz => "datetimeoffset".to_string(),
            SqlType::Uuid => "uniqueidentifier".to_string(),
            SqlType::Other(name) => name.clone(),
        }
    }

    fn column_definition(&self, column: &Column) -> Result<String> {
        let mut def = format!("{} {}", self.quote_ident(&column.name)?, self.column_type(column));
        if column.auto_increment {
            def.push_str(" IDENTITY(1,1)");
        }
        def.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let (Some(default), false) = (&column.default, column.auto_increment) {
            def.push_str(&format!(
                " CONSTRAINT {} DEFAULT {}",
                self.quote_ident(&Self::default_constraint(&column.table, &column.name))?,
                Self::default_sql(default)
            ));
        }
        Ok(def)
    }

    fn primary_key_clause(&self, table: &Table, pk: &Index) -> Result<String> {
        Ok(format!(
            "CONSTRAINT {} PRIMARY KEY ({})",
            self.quote_ident(&Self::pk_constraint(table))?,
            self.column_list(&pk.columns)?
        ))
    }

    fn add_column(
        &self,
        table: &Table,
        column: &Column,
        _prev: Option<&Column>,
        _next: Option<&Column>,
    ) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} ADD {}",
            self.qualify(table)?,
            self.column_definition(column)?
        )])
    }

    fn alter_column(&self, table: &Table, new: &Column, old: &Column) -> Result<Vec<String>> {
        let qualified = self.qualify(table)?;
        let constraint = self.quote_ident(&Self::default_constraint(&table.name, &new.name))?;
        let mut statements = Vec::new();

        if new.auto_increment != old.auto_increment {
            warn!(
                "{}.{}: SQL Server cannot change IDENTITY on an existing column; leaving it as is",
                table.name, new.name
            );
        }

        let default_changed = new.default != old.default;
        if default_changed && old.default.is_some() {
            statements.push(format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                qualified, constraint
            ));
        }

        let new_shape = self.type_and_null(new);
        if new_shape != self.type_and_null(old) {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} {}",
                qualified,
                self.quote_ident(&new.name)?,
                new_shape
            ));
        }

        if default_changed {
            if let Some(default) = &new.default {
                statements.push(format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT {} FOR {}",
                    qualified,
                    constraint,
                    Self::default_sql(default),
                    self.quote_ident(&new.name)?
                ));
            }
        }

        Ok(statements)
    }

    fn drop_column(&self, table: &Table, column: &Column) -> Result<Vec<String>> {
        let qualified = self.qualify(table)?;
        let mut statements = Vec::new();
        if column.default.is_some() && !column.auto_increment {
            statements.push(format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                qualified,
                self.quote_ident(&Self::default_constraint(&table.name, &column.name))?
            ));
        }
        statements.push(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            qualified,
            self.quote_ident(&column.name)?
        ));
        Ok(statements)
    }

    fn create_index(&self, table: &Table, index: &Index) -> Result<Vec<String>> {
        if index.is_primary() {
            return Ok(vec![format!(
                "ALTER TABLE {} ADD {}",
                self.qualify(table)?,
                self.primary_key_clause(table, index)?
            )]);
        }
        Ok(vec![create_plain_index(self, table, index)?])
    }

    fn drop_index(&self, table: &Table, index: &Index) -> Result<Vec<String>> {
        if index.is_primary() {
            return Ok(vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.qualify(table)?,
                self.quote_ident(&Self::pk_constraint(table))?
            )]);
        }
        Ok(vec![format!(
            "DROP INDEX {} ON {}",
            self.quote_ident(&index.name)?,
            self.qualify(table)?
        )])
    }
}

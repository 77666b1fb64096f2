//! PostgreSQL DDL.

use crate::core::identifier::quote_pg;
use crate::core::schema::{Column, Index, SqlType, Table};
use crate::error::Result;

use super::{create_plain_index, size_suffix, SchemaDialect};

/// PostgreSQL schema dialect.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// Name PostgreSQL gives an unnamed primary key constraint.
    fn pk_constraint(table: &Table) -> String {
        format!("{}_pkey", table.name)
    }
}

impl SchemaDialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_pg(name)
    }

    fn column_type(&self, column: &Column) -> String {
        match &column.sql_type {
            SqlType::Boolean => "boolean".to_string(),
            SqlType::SmallInt => "smallint".to_string(),
            SqlType::Integer => "integer".to_string(),
            SqlType::BigInt => "bigint".to_string(),
            SqlType::Real => "real".to_string(),
            SqlType::Double => "double precision".to_string(),
            SqlType::Decimal => match size_suffix(column) {
                Some(size) => format!("numeric{}", size),
                None => "numeric".to_string(),
            },
            SqlType::Char => match size_suffix(column) {
                Some(size) => format!("char{}", size),
                None => "char".to_string(),
            },
            SqlType::Varchar => match size_suffix(column) {
                Some(size) => format!("varchar{}", size),
                None => "text".to_string(),
            },
            SqlType::Text => "text".to_string(),
            SqlType::Binary | SqlType::Blob => "bytea".to_string(),
            SqlType::Date => "date".to_string(),
            SqlType::Time => "time".to_string(),
            SqlType::Timestamp => "timestamp".to_string(),
            SqlType::TimestampTz => "timestamptz".to_string(),
            SqlType::Uuid => "uuid".to_string(),
            SqlType::Json => "jsonb".to_string(),
            SqlType::Other(name) => name.clone(),
        }
    }

    fn column_definition(&self, column: &Column) -> Result<String> {
        let mut def = format!("{} {}", self.quote_ident(&column.name)?, self.column_type(column));
        if column.auto_increment {
            def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        } else if let Some(default) = &column.default {
            def.push_str(" DEFAULT ");
            def.push_str(&default.to_sql());
        }
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        Ok(def)
    }

    fn add_column(
        &self,
        table: &Table,
        column: &Column,
        _prev: Option<&Column>,
        _next: Option<&Column>,
    ) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.qualify(table)?,
            self.column_definition(column)?
        )])
    }

    fn alter_column(&self, table: &Table, new: &Column, old: &Column) -> Result<Vec<String>> {
        let prefix = format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            self.qualify(table)?,
            self.quote_ident(&new.name)?
        );
        let mut statements = Vec::new();

        let new_type = self.column_type(new);
        if new_type != self.column_type(old) {
            statements.push(format!(
                "{} TYPE {} USING {}::{}",
                prefix,
                new_type,
                self.quote_ident(&new.name)?,
                new_type
            ));
        }

        if new.auto_increment != old.auto_increment {
            if new.auto_increment {
                if old.default.is_some() {
                    statements.push(format!("{} DROP DEFAULT", prefix));
                }
                statements.push(format!("{} ADD GENERATED BY DEFAULT AS IDENTITY", prefix));
            } else {
                statements.push(format!("{} DROP IDENTITY IF EXISTS", prefix));
            }
        }

        if !new.auto_increment && new.default != old.default {
            match &new.default {
                Some(default) => {
                    statements.push(format!("{} SET DEFAULT {}", prefix, default.to_sql()))
                }
                None => statements.push(format!("{} DROP DEFAULT", prefix)),
            }
        }

        if new.nullable != old.nullable {
            let clause = if new.nullable {
                "DROP NOT NULL"
            } else {
                "SET NOT NULL"
            };
            statements.push(format!("{} {}", prefix, clause));
        }

        Ok(statements)
    }

    fn create_index(&self, table: &Table, index: &Index) -> Result<Vec<String>> {
        if index.is_primary() {
            return Ok(vec![format!(
                "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
                self.qualify(table)?,
                self.quote_ident(&Self::pk_constraint(table))?,
                self.column_list(&index.columns)?
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
        let name = if table.schema.is_empty() {
            self.quote_ident(&index.name)?
        } else {
            format!(
                "{}.{}",
                self.quote_ident(&table.schema)?,
                self.quote_ident(&index.name)?
            )
        };
        Ok(vec![format!("DROP INDEX IF EXISTS {}", name)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ColumnDefault;
    use crate::core::value::SqlValue;

    fn table() -> Table {
        Table::new("public", "users")
    }

    #[test]
    fn test_column_types() {
        let d = PostgresDialect::new();
        let varchar = Column::new("t", "c", SqlType::Varchar).with_size(50, 0);
        assert_eq!(d.column_type(&varchar), "varchar(50)");
        assert_eq!(d.column_type(&Column::new("t", "c", SqlType::Varchar)), "text");
        let dec = Column::new("t", "c", SqlType::Decimal).with_size(12, 2);
        assert_eq!(d.column_type(&dec), "numeric(12,2)");
        assert_eq!(d.column_type(&Column::new("t", "c", SqlType::Blob)), "bytea");
    }

    #[test]
    fn test_column_definition_default_and_not_null() {
        let d = PostgresDialect::new();
        let col = Column::new("users", "status", SqlType::Varchar)
            .with_size(10, 0)
            .with_default(ColumnDefault::Literal(SqlValue::from("new")))
            .not_null();
        assert_eq!(
            d.column_definition(&col).unwrap(),
            "\"status\" varchar(10) DEFAULT 'new' NOT NULL"
        );
    }

    #[test]
    fn test_alter_column_emits_only_changes() {
        let d = PostgresDialect::new();
        let old = Column::new("users", "name", SqlType::Varchar).with_size(20, 0);
        let new = old.clone().with_size(50, 0);
        let statements = d.alter_column(&table(), &new, &old).unwrap();
        assert_eq!(
            statements,
            vec!["ALTER TABLE \"public\".\"users\" ALTER COLUMN \"name\" TYPE varchar(50) USING \"name\"::varchar(50)"]
        );

        let stricter = old.clone().not_null();
        let statements = d.alter_column(&table(), &stricter, &old).unwrap();
        assert_eq!(
            statements,
            vec!["ALTER TABLE \"public\".\"users\" ALTER COLUMN \"name\" SET NOT NULL"]
        );
    }

    #[test]
    fn test_primary_key_round_trip_names() {
        let d = PostgresDialect::new();
        let pk = Index::primary(["id"]);
        assert_eq!(
            d.create_index(&table(), &pk).unwrap()[0],
            "ALTER TABLE \"public\".\"users\" ADD CONSTRAINT \"users_pkey\" PRIMARY KEY (\"id\")"
        );
        assert_eq!(
            d.drop_index(&table(), &pk).unwrap()[0],
            "ALTER TABLE \"public\".\"users\" DROP CONSTRAINT \"users_pkey\""
        );
    }

    #[test]
    fn test_drop_index_is_schema_qualified() {
        let d = PostgresDialect::new();
        let ix = Index::named("ix_users_name", false, ["name"]);
        assert_eq!(
            d.drop_index(&table(), &ix).unwrap(),
            vec!["DROP INDEX IF EXISTS \"public\".\"ix_users_name\""]
        );
    }
}

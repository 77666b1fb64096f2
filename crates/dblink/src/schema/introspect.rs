//! Live schema introspection through a [`DataLink`].

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::identifier::split_qualified;
use crate::core::procedure::{ParamDirection, Procedure, ReturnFlavor};
use crate::core::schema::{
    Column, ColumnDefault, Index, Relationship, SqlType, Table, TableChange, TableInfo, TableKind,
};
use crate::core::traits::{CatalogColumn, CatalogIndexColumn};
use crate::dialect::SchemaDialect;
use crate::error::{DbError, Result};
use crate::link::{DataLink, QueryBounds};

/// What [`Introspector::describe_tables`] collects beyond columns and the primary key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescribeOptions {
    /// Read unique and normal indices.
    pub indices: bool,
    /// Run a count query per table.
    pub row_count: bool,
}

/// Outcome of a describe batch.
#[derive(Debug, Clone, Default)]
pub struct DescribeReport {
    /// Tables described successfully, in request order.
    pub tables: Vec<Table>,
    /// Tables whose metadata could not be read, with the reason.
    pub skipped: Vec<(String, String)>,
}

/// Desired tables paired with their live counterparts.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// One change per desired table that could be paired.
    pub changes: Vec<TableChange>,
    /// Live tables whose definition could not be read, with the reason.
    pub skipped: Vec<(String, String)>,
}

/// Reads table, index, key and procedure metadata from a live connection.
pub struct Introspector<'a> {
    link: &'a mut DataLink,
    dialect: &'a dyn SchemaDialect,
    schema: String,
}

impl<'a> Introspector<'a> {
    /// Introspect `schema` through `link`; `dialect` quotes generated probes.
    pub fn new(
        link: &'a mut DataLink,
        dialect: &'a dyn SchemaDialect,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            link,
            dialect,
            schema: schema.into(),
        }
    }

    /// List tables of the requested kinds, sorted by name.
    ///
    /// An empty filter lists every kind. Checks `cancel` between catalog rows.
    pub async fn list_tables(
        &mut self,
        kinds: &[TableKind],
        cancel: &CancellationToken,
    ) -> Result<Vec<TableInfo>> {
        if cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        let name = self.link.name().to_string();
        let catalog = match self.link.connection().await {
            Ok(conn) => conn.catalog_tables(&self.schema).await,
            Err(e) => Err(e),
        }
        .map_err(|e| e.on_source(&name))?;

        let mut tables = Vec::with_capacity(catalog.len());
        for entry in catalog {
            if cancel.is_cancelled() {
                info!("Table listing cancelled after {} entries", tables.len());
                return Err(DbError::Cancelled);
            }
            let kind = TableKind::from_catalog(&entry.table_type);
            if kinds.is_empty() || kinds.contains(&kind) {
                tables.push(TableInfo {
                    schema: entry.schema,
                    name: entry.name,
                    kind,
                });
            }
        }
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    /// Describe each table; a failing table is logged and skipped.
    pub async fn describe_tables(
        &mut self,
        tables: &[TableInfo],
        options: DescribeOptions,
    ) -> DescribeReport {
        let mut report = DescribeReport::default();
        for info in tables {
            match self.describe_table(info, options).await {
                Ok(table) => report.tables.push(table),
                Err(e) => {
                    let e = DbError::introspection(info.full_name(), e.to_string());
                    warn!("{}", e);
                    report.skipped.push((info.full_name(), e.to_string()));
                }
            }
        }
        debug!(
            "Described {} tables, skipped {}",
            report.tables.len(),
            report.skipped.len()
        );
        report
    }

    /// Pair each desired table with the live table of the same name.
    ///
    /// Tables missing from the schema become creates. A live table that
    /// cannot be described is skipped rather than recreated.
    pub async fn pair_changes(
        &mut self,
        desired: Vec<Table>,
        cancel: &CancellationToken,
    ) -> Result<ChangeSet> {
        let live = self.list_tables(&[TableKind::Table], cancel).await?;
        let existing: Vec<TableInfo> = live
            .into_iter()
            .filter(|info| {
                desired
                    .iter()
                    .any(|t| t.name == info.name && t.schema == info.schema)
            })
            .collect();

        let options = DescribeOptions {
            indices: true,
            row_count: false,
        };
        let report = self.describe_tables(&existing, options).await;
        let mut described = report.tables;

        let mut changes = Vec::with_capacity(desired.len());
        for table in desired {
            let full_name = table.full_name();
            if report.skipped.iter().any(|(name, _)| *name == full_name) {
                continue;
            }
            match described
                .iter()
                .position(|e| e.name == table.name && e.schema == table.schema)
            {
                Some(i) => changes.push(TableChange::Alter {
                    existing: described.swap_remove(i),
                    desired: table,
                }),
                None => changes.push(TableChange::Create(table)),
            }
        }

        Ok(ChangeSet {
            changes,
            skipped: report.skipped,
        })
    }

    async fn describe_table(&mut self, info: &TableInfo, options: DescribeOptions) -> Result<Table> {
        let mut table = Table::new(info.schema.clone(), info.name.clone());
        let qualified = self.dialect.qualify(&table)?;

        let probe = self
            .link
            .query(
                &format!("SELECT * FROM {} WHERE 1 = 0", qualified),
                &[],
                QueryBounds::all(),
            )
            .await?;

        let conn = self.link.connection().await?;
        let catalog_columns = conn.catalog_columns(&info.schema, &info.name).await?;
        for meta in &probe.columns {
            let mut column = Column::from_meta(&info.name, meta);
            if let Some(catalog) = catalog_columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(&meta.name))
            {
                merge_catalog_column(&mut column, catalog);
            }
            table = table.with_column(column);
        }

        let pk = conn.catalog_primary_key(&info.schema, &info.name).await?;
        if !pk.is_empty() {
            table = table.with_index(Index::primary(pk));
        }

        if options.indices {
            let rows = conn.catalog_indexes(&info.schema, &info.name).await?;
            for index in group_indexes(rows) {
                table = table.with_index(index);
            }
        }

        if options.row_count {
            let count = self
                .link
                .query(
                    &format!("SELECT COUNT(*) FROM {}", qualified),
                    &[],
                    QueryBounds::all(),
                )
                .await;
            table.row_count = match count {
                Ok(rowset) => rowset.scalar().and_then(|v| v.as_i64()),
                Err(e) => {
                    debug!("Row count for {} unavailable: {}", info.full_name(), e);
                    None
                }
            };
        }

        Ok(table)
    }

    /// Foreign keys among `tables`; keys referencing other tables are dropped.
    pub async fn derive_relationships(&mut self, tables: &[TableInfo]) -> Result<Vec<Relationship>> {
        let members: HashSet<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        let name = self.link.name().to_string();
        let mut relationships = Vec::new();

        for info in tables {
            let rows = match self.link.connection().await {
                Ok(conn) => conn.catalog_exported_keys(&info.schema, &info.name).await,
                Err(e) => Err(e),
            }
            .map_err(|e| e.on_source(&name))?;

            let mut current: Option<Relationship> = None;
            for row in rows {
                if row.key_seq == 1 || current.is_none() {
                    relationships.extend(current.take());
                    current = Some(Relationship {
                        name: row.fk_name.clone(),
                        pk_table: row.pk_table.clone(),
                        fk_table: row.fk_table.clone(),
                        columns: Vec::new(),
                    });
                }
                if let Some(rel) = current.as_mut() {
                    rel.columns.push((row.pk_column, row.fk_column));
                }
            }
            relationships.extend(current);
        }

        relationships.retain(|r| {
            members.contains(r.pk_table.as_str()) && members.contains(r.fk_table.as_str())
        });
        Ok(relationships)
    }

    /// Read a procedure signature from the catalog.
    pub async fn describe_procedure(&mut self, name: &str) -> Result<Procedure> {
        let (schema, proc_name) = split_qualified(name);
        let schema = if schema.is_empty() {
            self.schema.as_str()
        } else {
            schema
        };
        let source = self.link.name().to_string();
        let found = match self.link.connection().await {
            Ok(conn) => conn.catalog_procedure(schema, proc_name).await,
            Err(e) => Err(e),
        }
        .map_err(|e| e.on_source(&source))?;

        let catalog = found.ok_or_else(|| {
            DbError::introspection(name, "procedure not found in the catalog")
        })?;

        let mut builder = Procedure::builder(name);
        for p in &catalog.params {
            builder = builder.param(
                p.name.clone(),
                ParamDirection::from_catalog(&p.mode),
                SqlType::from_type_name(&p.type_name),
            );
        }
        let has_outputs = catalog
            .params
            .iter()
            .any(|p| ParamDirection::from_catalog(&p.mode).is_output());

        builder = match catalog.return_type.as_deref() {
            _ if catalog.returns_set => builder.returns_rows(),
            None => builder.flavor(ReturnFlavor::Void),
            Some(t) if t.eq_ignore_ascii_case("void") => builder.flavor(ReturnFlavor::Void),
            Some(t) if t.eq_ignore_ascii_case("record") && has_outputs => {
                builder.flavor(ReturnFlavor::Void)
            }
            Some(t) => builder.returns(SqlType::from_type_name(t)),
        };
        Ok(builder.build())
    }
}

/// Fill in what the zero-row probe could not report.
fn merge_catalog_column(column: &mut Column, catalog: &CatalogColumn) {
    if catalog.length > 0 {
        column.length = catalog.length;
        column.scale = catalog.scale;
    }
    if let Some(nullable) = catalog.nullable {
        column.nullable = nullable;
    }
    column.auto_increment |= catalog.auto_increment;
    // Identity columns own their default (a sequence call); it is not user data.
    column.default = match catalog.default.as_deref() {
        Some(_) if column.auto_increment => None,
        Some(raw) => ColumnDefault::coerce(raw, &column.sql_type),
        None => None,
    };
}

/// Group per-column index rows by index name, keeping report order.
fn group_indexes(rows: Vec<CatalogIndexColumn>) -> Vec<Index> {
    let mut grouped: Vec<(Index, Vec<(i32, String)>)> = Vec::new();
    for row in rows {
        match grouped.iter_mut().find(|(i, _)| i.name == row.index_name) {
            Some((_, cols)) => cols.push((row.ordinal, row.column)),
            None => grouped.push((
                Index::named(row.index_name, row.unique, Vec::<String>::new()),
                vec![(row.ordinal, row.column)],
            )),
        }
    }
    grouped
        .into_iter()
        .map(|(mut index, mut cols)| {
            cols.sort_by_key(|(ordinal, _)| *ordinal);
            index.columns = cols.into_iter().map(|(_, c)| c).collect();
            index
        })
        .collect()
}

//! Three-way table diff and the migrator that applies it.

use tracing::{debug, info, warn};

use crate::core::schema::{names_match, Column, Index, Table, TableChange};
use crate::dialect::SchemaDialect;
use crate::error::Result;
use crate::link::DataLink;

use super::ChangeSet;

/// One backend-neutral schema change against a table.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaOp {
    /// Create the whole table, indices included.
    CreateTable,
    /// Add a column; `prev`/`next` are its neighbors in the desired order.
    AddColumn {
        column: Column,
        prev: Option<Column>,
        next: Option<Column>,
    },
    /// Change a column's definition.
    AlterColumn { new: Column, old: Column },
    DropColumn(Column),
    CreateIndex(Index),
    DropIndex(Index),
}

/// The operations that turn one table into its desired shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDiff {
    /// The desired table; dialects render every operation against it.
    pub table: Table,
    pub ops: Vec<SchemaOp>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Render every operation into statements, in order.
    pub fn render(&self, dialect: &dyn SchemaDialect) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for op in &self.ops {
            statements.extend(render_op(dialect, &self.table, op)?);
        }
        Ok(statements)
    }
}

fn render_op(dialect: &dyn SchemaDialect, table: &Table, op: &SchemaOp) -> Result<Vec<String>> {
    match op {
        SchemaOp::CreateTable => dialect.create_table(table),
        SchemaOp::AddColumn { column, prev, next } => {
            dialect.add_column(table, column, prev.as_ref(), next.as_ref())
        }
        SchemaOp::AlterColumn { new, old } => dialect.alter_column(table, new, old),
        SchemaOp::DropColumn(column) => dialect.drop_column(table, column),
        SchemaOp::CreateIndex(index) => dialect.create_index(table, index),
        SchemaOp::DropIndex(index) => dialect.drop_index(table, index),
    }
}

/// Classify one change request into operations.
pub fn diff_change(change: &TableChange, case_sensitive: bool) -> TableDiff {
    match change {
        TableChange::Create(table) => TableDiff {
            table: table.clone(),
            ops: vec![SchemaOp::CreateTable],
        },
        TableChange::Alter { desired, existing } => TableDiff {
            table: desired.clone(),
            ops: diff_tables(desired, existing, case_sensitive),
        },
    }
}

/// Operations turning `existing` into `desired`.
///
/// Order: index drops, column adds and alters (desired column order),
/// column drops, index creates. Each column is visited exactly once.
pub fn diff_tables(desired: &Table, existing: &Table, case_sensitive: bool) -> Vec<SchemaOp> {
    let mut column_ops = Vec::new();
    for (i, column) in desired.columns.iter().enumerate() {
        match existing.column(&column.name, case_sensitive) {
            None => column_ops.push(SchemaOp::AddColumn {
                column: column.clone(),
                prev: i.checked_sub(1).map(|p| desired.columns[p].clone()),
                next: desired.columns.get(i + 1).cloned(),
            }),
            Some(old) if !column.same_definition(old) => column_ops.push(SchemaOp::AlterColumn {
                new: column.clone(),
                old: old.clone(),
            }),
            Some(_) => {}
        }
    }

    let drops = existing
        .columns
        .iter()
        .filter(|old| desired.column(&old.name, case_sensitive).is_none())
        .map(|old| SchemaOp::DropColumn(old.clone()));

    let mut index_drops = Vec::new();
    let mut index_creates = Vec::new();
    for index in &desired.indexes {
        match matching_index(existing, index, case_sensitive) {
            None => index_creates.push(SchemaOp::CreateIndex(index.clone())),
            Some(old) if !index.same_definition(old, case_sensitive) => {
                index_drops.push(SchemaOp::DropIndex(old.clone()));
                index_creates.push(SchemaOp::CreateIndex(index.clone()));
            }
            Some(_) => {}
        }
    }
    for old in &existing.indexes {
        if matching_index(desired, old, case_sensitive).is_none() {
            index_drops.push(SchemaOp::DropIndex(old.clone()));
        }
    }

    let mut ops = index_drops;
    ops.extend(column_ops);
    ops.extend(drops);
    ops.extend(index_creates);
    ops
}

/// The primary key matches by kind; other indices match by name.
fn matching_index<'t>(table: &'t Table, index: &Index, case_sensitive: bool) -> Option<&'t Index> {
    if index.is_primary() {
        table.primary_key()
    } else {
        table
            .indexes
            .iter()
            .find(|i| !i.is_primary() && names_match(&i.name, &index.name, case_sensitive))
    }
}

/// Outcome of [`Migrator::synchronize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Statements executed successfully.
    pub statements_issued: usize,
    /// Tables whose changes all applied.
    pub tables_changed: usize,
    /// Tables already in the desired shape.
    pub tables_unchanged: usize,
    /// Tables whose changes failed part-way, with the error.
    pub failed: Vec<(String, String)>,
    /// Tables left out because their live definition could not be read.
    pub skipped: Vec<(String, String)>,
}

/// Applies table change requests through a [`DataLink`].
pub struct Migrator<'a> {
    link: &'a mut DataLink,
    dialect: &'a dyn SchemaDialect,
    case_sensitive: Option<bool>,
}

impl<'a> Migrator<'a> {
    pub fn new(link: &'a mut DataLink, dialect: &'a dyn SchemaDialect) -> Self {
        Self {
            link,
            dialect,
            case_sensitive: None,
        }
    }

    /// Override the backend's identifier case sensitivity for name matching.
    pub fn case_sensitive(mut self, case_sensitive: Option<bool>) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    async fn resolve_case_sensitivity(&mut self) -> Result<bool> {
        match self.case_sensitive {
            Some(flag) => Ok(flag),
            None => Ok(self.link.capabilities().await?.case_sensitive_identifiers),
        }
    }

    /// Statements `synchronize` would run, without running them.
    pub async fn plan(&mut self, changes: &[TableChange]) -> Result<Vec<String>> {
        let case_sensitive = self.resolve_case_sensitivity().await?;
        let mut statements = Vec::new();
        for change in changes {
            statements.extend(diff_change(change, case_sensitive).render(self.dialect)?);
        }
        Ok(statements)
    }

    /// Apply each change; a failing table stops there and the batch moves on.
    pub async fn synchronize(&mut self, changes: Vec<TableChange>) -> Result<SyncReport> {
        let case_sensitive = self.resolve_case_sensitivity().await?;
        let mut report = SyncReport::default();

        for change in changes {
            let diff = diff_change(&change, case_sensitive);
            let table_name = diff.table.full_name();
            if diff.is_empty() {
                debug!("{} already matches", table_name);
                report.tables_unchanged += 1;
                continue;
            }

            match self.apply(&diff, &mut report.statements_issued).await {
                Ok(()) => {
                    info!("{}: applied {} schema operations", table_name, diff.ops.len());
                    report.tables_changed += 1;
                }
                Err(e) => {
                    warn!("{}: schema change failed: {}", table_name, e);
                    report.failed.push((table_name, e.to_string()));
                }
            }
        }

        info!(
            "Schema sync issued {} statements ({} tables changed, {} failed)",
            report.statements_issued,
            report.tables_changed,
            report.failed.len()
        );
        Ok(report)
    }

    /// Apply a paired change set; its skipped tables are carried into the report.
    pub async fn synchronize_set(&mut self, set: ChangeSet) -> Result<SyncReport> {
        let mut report = self.synchronize(set.changes).await?;
        if !set.skipped.is_empty() {
            warn!(
                "{} table(s) skipped: live definition unreadable",
                set.skipped.len()
            );
        }
        report.skipped = set.skipped;
        Ok(report)
    }

    async fn apply(&mut self, diff: &TableDiff, issued: &mut usize) -> Result<()> {
        for statement in diff.render(self.dialect)? {
            debug!("{}", statement);
            self.link.write(&statement, &[], false).await?;
            *issued += 1;
        }
        Ok(())
    }
}

//! Procedure calls translated from `{call ...}` text into PostgreSQL
//! `SELECT`/`CALL` statements.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::error::SqlState;
use tokio_postgres::Client;
use tracing::debug;

use crate::core::procedure::ReturnFlavor;
use crate::core::schema::SqlType;
use crate::core::traits::{CallHandle, Cursor, CursorKind};
use crate::core::value::SqlValue;
use crate::error::{DbError, Result};

use super::cursor::PgCursor;
use super::types::{decode_row, params};

/// Parsed `{[? = ]call NAME(?,...)}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallText {
    pub name: String,
    pub has_return: bool,
    pub placeholders: usize,
}

impl CallText {
    pub(crate) fn parse(text: &str) -> Result<Self> {
        let invalid = || DbError::Driver(format!("malformed call text: {}", text));

        let body = text
            .trim()
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(invalid)?
            .trim();
        let (has_return, body) = match body.strip_prefix('?') {
            Some(rest) => (
                true,
                rest.trim_start().strip_prefix('=').ok_or_else(invalid)?.trim_start(),
            ),
            None => (false, body),
        };
        let body = body.strip_prefix("call ").ok_or_else(invalid)?.trim();

        let open = body.find('(').ok_or_else(invalid)?;
        let args = body[open + 1..].strip_suffix(')').ok_or_else(invalid)?;
        let placeholders = args.matches('?').count();

        Ok(Self {
            name: body[..open].trim().to_string(),
            has_return,
            placeholders,
        })
    }

    /// Total slots, including the return slot.
    fn slots(&self) -> usize {
        self.placeholders + usize::from(self.has_return)
    }

    /// First slot that maps to a procedure argument.
    fn first_arg_slot(&self) -> usize {
        if self.has_return {
            2
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    input: Option<SqlValue>,
    output: bool,
}

/// A prepared call against one PostgreSQL connection.
pub struct PgCall {
    client: Arc<Client>,
    text: CallText,
    flavor: ReturnFlavor,
    cursor_name: String,
    slots: Vec<Slot>,
    outputs: BTreeMap<usize, SqlValue>,
    cursor: Option<Box<dyn Cursor>>,
    executed: bool,
}

impl PgCall {
    pub(crate) fn new(
        client: Arc<Client>,
        call_text: &str,
        flavor: ReturnFlavor,
        cursor_name: String,
    ) -> Result<Self> {
        let text = CallText::parse(call_text)?;
        let slots = vec![Slot::default(); text.slots()];
        Ok(Self {
            client,
            text,
            flavor,
            cursor_name,
            slots,
            outputs: BTreeMap::new(),
            cursor: None,
            executed: false,
        })
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut Slot> {
        let max = self.slots.len();
        if index == 0 || index > max {
            return Err(DbError::range("call slot", index as i64, max as i64));
        }
        Ok(&mut self.slots[index - 1])
    }

    /// Argument slots as `(slot, slot state)`.
    fn arguments(&self) -> impl Iterator<Item = (usize, &Slot)> {
        let first = self.text.first_arg_slot();
        self.slots.iter().enumerate().skip(first - 1).map(|(i, s)| (i + 1, s))
    }

    /// Input values plus their `$n` placeholders.
    ///
    /// With `pass_outputs`, output-only arguments are passed as NULL (as
    /// `CALL` requires); otherwise they are left out.
    fn bind_arguments(&self, pass_outputs: bool) -> (Vec<SqlValue>, String) {
        let mut values = Vec::new();
        for (_, slot) in self.arguments() {
            match &slot.input {
                Some(v) => values.push(v.clone()),
                None if pass_outputs || !slot.output => values.push(SqlValue::Null),
                None => {}
            }
        }
        let placeholders = (1..=values.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");
        (values, placeholders)
    }

    /// Output slots in slot order; the return slot first when present.
    fn output_slots(&self) -> Vec<usize> {
        let mut out = Vec::new();
        if self.text.has_return {
            out.push(1);
        }
        out.extend(self.arguments().filter(|(_, s)| s.output).map(|(i, _)| i));
        out
    }

    async fn read_outputs(&mut self, sql: &str, values: &[SqlValue]) -> Result<()> {
        let rows = self.client.query(sql, &params(values)).await?;
        let row = rows.first().map(decode_row).unwrap_or_default();
        for (column, slot) in self.output_slots().into_iter().enumerate() {
            let value = row.get(column).cloned().unwrap_or(SqlValue::Null);
            self.outputs.insert(slot, value);
        }
        Ok(())
    }
}

#[async_trait]
impl CallHandle for PgCall {
    fn set(&mut self, index: usize, value: SqlValue) -> Result<()> {
        self.slot_mut(index)?.input = Some(value);
        Ok(())
    }

    fn register_out(&mut self, index: usize, _sql_type: &SqlType) -> Result<()> {
        self.slot_mut(index)?.output = true;
        Ok(())
    }

    async fn execute(&mut self) -> Result<()> {
        let name = self.text.name.clone();
        match self.flavor {
            ReturnFlavor::Type => {
                let (values, placeholders) = self.bind_arguments(false);
                let sql = format!("SELECT * FROM {}({})", name, placeholders);
                debug!("Executing {}", sql);
                self.read_outputs(&sql, &values).await?;
            }
            ReturnFlavor::Void => {
                let (values, placeholders) = self.bind_arguments(true);
                let sql = format!("CALL {}({})", name, placeholders);
                debug!("Executing {}", sql);
                match self.read_outputs(&sql, &values).await {
                    // Functions (void or with OUT parameters) cannot be CALLed.
                    Err(DbError::Postgres(e)) if e.code() == Some(&SqlState::WRONG_OBJECT_TYPE) => {
                        let (values, placeholders) = self.bind_arguments(false);
                        let sql = format!("SELECT * FROM {}({})", name, placeholders);
                        debug!("{} is a function; executing {}", name, sql);
                        self.read_outputs(&sql, &values).await?;
                    }
                    other => other?,
                }
            }
            ReturnFlavor::ResultSet | ReturnFlavor::Unknown => {
                let (values, placeholders) = self.bind_arguments(false);
                let sql = format!("SELECT * FROM {}({})", name, placeholders);
                debug!("Opening cursor over {}", sql);
                let cursor = PgCursor::declare(
                    Arc::clone(&self.client),
                    self.cursor_name.clone(),
                    &sql,
                    &values,
                    CursorKind::ScrollInsensitive,
                )
                .await?;
                self.cursor = Some(Box::new(cursor));
            }
        }
        self.executed = true;
        Ok(())
    }

    fn get(&self, index: usize) -> Result<SqlValue> {
        if !self.executed {
            return Err(DbError::Driver("call has not been executed".into()));
        }
        if index == 0 || index > self.slots.len() {
            return Err(DbError::range("call slot", index as i64, self.slots.len() as i64));
        }
        Ok(self.outputs.get(&index).cloned().unwrap_or(SqlValue::Null))
    }

    fn take_cursor(&mut self) -> Option<Box<dyn Cursor>> {
        self.cursor.take()
    }

    async fn close(&mut self) -> Result<()> {
        self.outputs.clear();
        Ok(())
    }
}

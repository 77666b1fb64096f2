//! Schema and metadata types for tables, columns, indexes and relationships.
//!
//! These types provide a backend-agnostic representation of schema metadata.
//! They are produced by the introspector, compared by the differ and rendered
//! into DDL by a schema dialect.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value::SqlValue;

/// Reserved index name standing in for the primary key.
pub const PRIMARY_KEY_NAME: &str = "PRIMARY";

/// Semantic column type, independent of any backend's spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal,
    Char,
    Varchar,
    Text,
    Binary,
    Blob,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
    /// Backend type with no semantic equivalent; keeps the native name.
    Other(String),
}

impl SqlType {
    /// Classify a backend type name (case-insensitive).
    ///
    /// Length/precision suffixes such as `varchar(20)` are ignored.
    pub fn from_type_name(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        let base = lower.split('(').next().unwrap_or("").trim();
        match base {
            "bool" | "boolean" | "bit" => SqlType::Boolean,
            "int2" | "smallint" | "tinyint" | "smallserial" => SqlType::SmallInt,
            "int" | "int4" | "integer" | "mediumint" | "serial" => SqlType::Integer,
            "int8" | "bigint" | "bigserial" => SqlType::BigInt,
            "float4" | "real" => SqlType::Real,
            "float" | "float8" | "double" | "double precision" => SqlType::Double,
            "numeric" | "decimal" | "money" | "smallmoney" => SqlType::Decimal,
            "char" | "character" | "bpchar" | "nchar" => SqlType::Char,
            "varchar" | "character varying" | "nvarchar" | "varchar2" => SqlType::Varchar,
            "text" | "ntext" | "clob" | "longtext" | "mediumtext" | "tinytext" => SqlType::Text,
            "binary" | "varbinary" => SqlType::Binary,
            "bytea" | "blob" | "image" | "longblob" | "mediumblob" => SqlType::Blob,
            "date" => SqlType::Date,
            "time" | "time without time zone" => SqlType::Time,
            "timestamp" | "timestamp without time zone" | "datetime" | "datetime2"
            | "smalldatetime" => SqlType::Timestamp,
            "timestamptz" | "timestamp with time zone" | "datetimeoffset" => SqlType::TimestampTz,
            "uuid" | "uniqueidentifier" => SqlType::Uuid,
            "json" | "jsonb" => SqlType::Json,
            _ => SqlType::Other(base.to_string()),
        }
    }

    /// Whether the declared length participates in the column definition.
    pub fn is_sized(&self) -> bool {
        matches!(
            self,
            SqlType::Char | SqlType::Varchar | SqlType::Binary | SqlType::Decimal
        )
    }

    /// Whether the type is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(self, SqlType::SmallInt | SqlType::Integer | SqlType::BigInt)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Other(name) => write!(f, "{}", name),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Default value of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDefault {
    /// A constant, coerced into the column's semantic type.
    Literal(SqlValue),
    /// A backend expression such as `now()` or `nextval('seq')`, kept verbatim.
    Expression(String),
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y", "%Y%m%d"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M:%S%.f", "%H:%M"];

impl ColumnDefault {
    /// Coerce a raw catalog default into the column's semantic type.
    ///
    /// Catalogs report defaults in backend syntax: `'abc'::character varying`
    /// on PostgreSQL, `((0))` on SQL Server, bare `0` on MySQL. Quoted
    /// literals that do not parse as the column type stay text; unquoted
    /// text that does not parse is treated as an expression.
    pub fn coerce(raw: &str, sql_type: &SqlType) -> Option<Self> {
        let trimmed = strip_parens(raw.trim());
        if trimmed.is_empty() {
            return None;
        }
        let unquoted_cast = strip_cast(trimmed);
        if unquoted_cast.eq_ignore_ascii_case("null") {
            return Some(ColumnDefault::Literal(SqlValue::Null));
        }

        match unquote(unquoted_cast) {
            Some(text) => Some(ColumnDefault::Literal(
                coerce_literal(&text, sql_type).unwrap_or(SqlValue::Text(text)),
            )),
            None => match coerce_literal(unquoted_cast, sql_type) {
                Some(value) => Some(ColumnDefault::Literal(value)),
                None => Some(ColumnDefault::Expression(trimmed.to_string())),
            },
        }
    }

    /// Render the default for a DDL `DEFAULT` clause.
    pub fn to_sql(&self) -> String {
        match self {
            ColumnDefault::Literal(v) => v.to_sql_literal(),
            ColumnDefault::Expression(e) => e.clone(),
        }
    }
}

fn strip_parens(mut s: &str) -> &str {
    while s.len() >= 2 && s.ends_with(')') && opening_paren_closes_at_end(s) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

/// Whether `s` opens with `(` whose matching `)` is the last character.
/// Parentheses inside single-quoted literals are ignored.
fn opening_paren_closes_at_end(s: &str) -> bool {
    if !s.starts_with('(') {
        return false;
    }
    let mut depth = 0usize;
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == s.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Drop a trailing PostgreSQL cast (`'x'::text`, `0::bigint`).
fn strip_cast(s: &str) -> &str {
    match s.rfind("::") {
        Some(pos) if s.starts_with('\'') || s.starts_with(|c: char| c.is_ascii_digit() || c == '-') => {
            s[..pos].trim()
        }
        _ => s,
    }
}

/// Return the contents of a single-quoted literal, undoubling quotes.
/// SQL Server's `N'...'` prefix is accepted.
fn unquote(s: &str) -> Option<String> {
    let s = s.strip_prefix('N').filter(|r| r.starts_with('\'')).unwrap_or(s);
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        Some(s[1..s.len() - 1].replace("''", "'"))
    } else {
        None
    }
}

fn coerce_literal(text: &str, sql_type: &SqlType) -> Option<SqlValue> {
    let text = text.trim();
    match sql_type {
        SqlType::SmallInt => text.parse::<i16>().ok().map(SqlValue::I16),
        SqlType::Integer => text.parse::<i32>().ok().map(SqlValue::I32),
        SqlType::BigInt => text.parse::<i64>().ok().map(SqlValue::I64),
        SqlType::Decimal => Decimal::from_str(text).ok().map(SqlValue::Decimal),
        SqlType::Real => text.parse::<f32>().ok().map(SqlValue::F32),
        SqlType::Double => text.parse::<f64>().ok().map(SqlValue::F64),
        SqlType::Boolean => match text.to_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "b'1'" => Some(SqlValue::Bool(true)),
            "false" | "f" | "0" | "no" | "b'0'" => Some(SqlValue::Bool(false)),
            _ => None,
        },
        SqlType::Date => DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
            .map(SqlValue::Date),
        SqlType::Timestamp | SqlType::TimestampTz => TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
            .or_else(|| {
                DATE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(SqlValue::DateTime),
        SqlType::Time => TIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
            .map(SqlValue::Time),
        SqlType::Uuid => uuid::Uuid::parse_str(text).ok().map(SqlValue::Uuid),
        // Character data only counts as a literal when quoted.
        _ => None,
    }
}

/// Shape of a result column as reported by a cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,
    /// Display label (defaults to the name).
    pub label: String,
    /// Backend type name.
    pub type_name: String,
    /// Length or precision, 0 when not applicable.
    pub length: i32,
    /// Numeric scale.
    pub scale: i32,
    /// Nullability, when the backend reports it.
    pub nullable: Option<bool>,
    /// Whether the column is auto-incremented by the backend.
    pub auto_increment: bool,
}

impl ColumnMeta {
    /// Minimal metadata from a name and a type name.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            type_name: type_name.into(),
            length: 0,
            scale: 0,
            nullable: None,
            auto_increment: false,
        }
    }
}

/// Column descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Owning table name.
    #[serde(default)]
    pub table: String,

    /// Column name.
    pub name: String,

    /// Caption shown to users (defaults to the name).
    #[serde(default)]
    pub caption: String,

    /// Semantic type.
    pub sql_type: SqlType,

    /// Length for character/binary types, precision for decimals (0 = unspecified).
    #[serde(default)]
    pub length: i32,

    /// Numeric scale.
    #[serde(default)]
    pub scale: i32,

    /// Default value.
    #[serde(default)]
    pub default: Option<ColumnDefault>,

    /// Whether the column allows NULL.
    #[serde(default = "default_true")]
    pub nullable: bool,

    /// Whether the backend generates values for the column.
    #[serde(default)]
    pub auto_increment: bool,
}

fn default_true() -> bool {
    true
}

impl Column {
    /// Create a nullable column with no default.
    pub fn new(table: impl Into<String>, name: impl Into<String>, sql_type: SqlType) -> Self {
        let name = name.into();
        Self {
            table: table.into(),
            caption: name.clone(),
            name,
            sql_type,
            length: 0,
            scale: 0,
            default: None,
            nullable: true,
            auto_increment: false,
        }
    }

    /// Build a column from probe metadata.
    pub fn from_meta(table: &str, meta: &ColumnMeta) -> Self {
        Self {
            table: table.to_string(),
            name: meta.name.clone(),
            caption: meta.label.clone(),
            sql_type: SqlType::from_type_name(&meta.type_name),
            length: meta.length,
            scale: meta.scale,
            default: None,
            nullable: meta.nullable.unwrap_or(true),
            auto_increment: meta.auto_increment,
        }
    }

    /// Set the length (or precision) and scale.
    pub fn with_size(mut self, length: i32, scale: i32) -> Self {
        self.length = length;
        self.scale = scale;
        self
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column auto-increment.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Set a default value.
    pub fn with_default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Definition equality: everything except the name, table and caption.
    ///
    /// Length only matters for sized types, scale only for decimals.
    pub fn same_definition(&self, other: &Column) -> bool {
        self.sql_type == other.sql_type
            && (!self.sql_type.is_sized() || self.length == other.length)
            && (self.sql_type != SqlType::Decimal || self.scale == other.scale)
            && self.nullable == other.nullable
            && self.auto_increment == other.auto_increment
            && self.default == other.default
    }
}

/// Compare two identifiers under the backend's case rule.
pub fn names_match(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

/// Index kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Primary,
    Unique,
    Normal,
}

/// Index descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    /// Index name ([`PRIMARY_KEY_NAME`] for the primary key).
    pub name: String,

    /// Index kind.
    pub kind: IndexKind,

    /// Indexed column names, in key order.
    pub columns: Vec<String>,
}

impl Index {
    /// Primary key over the given columns.
    pub fn primary<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: PRIMARY_KEY_NAME.to_string(),
            kind: IndexKind::Primary,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Named unique or normal index.
    pub fn named<I, S>(name: impl Into<String>, unique: bool, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: if unique {
                IndexKind::Unique
            } else {
                IndexKind::Normal
            },
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this is the primary key.
    pub fn is_primary(&self) -> bool {
        self.kind == IndexKind::Primary
    }

    /// Structural equality: kind and ordered columns, names ignored.
    pub fn same_definition(&self, other: &Index, case_sensitive: bool) -> bool {
        self.kind == other.kind
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| names_match(a, b, case_sensitive))
    }
}

/// Table descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Schema name (empty for the connection default).
    #[serde(default)]
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Column definitions in caller-defined order.
    #[serde(default)]
    pub columns: Vec<Column>,

    /// Indexes, including the primary key.
    #[serde(default)]
    pub indexes: Vec<Index>,

    /// Row count estimate; `None` when unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
}

impl Table {
    /// Create an empty table descriptor.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            row_count: None,
        }
    }

    /// Append a column, stamping it with this table's name.
    pub fn with_column(mut self, mut column: Column) -> Self {
        column.table = self.name.clone();
        self.columns.push(column);
        self
    }

    /// Add an index.
    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }

    /// Find a column by name.
    pub fn column(&self, name: &str, case_sensitive: bool) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| names_match(&c.name, name, case_sensitive))
    }

    /// The primary key, if any.
    pub fn primary_key(&self) -> Option<&Index> {
        self.indexes.iter().find(|i| i.is_primary())
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        self.primary_key().is_some()
    }
}

/// Catalog classification of a table-like object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Table,
    View,
    Other,
}

impl TableKind {
    /// Classify a catalog type string such as `BASE TABLE` or `VIEW`.
    pub fn from_catalog(type_name: &str) -> Self {
        match type_name.trim().to_uppercase().as_str() {
            "TABLE" | "BASE TABLE" => TableKind::Table,
            "VIEW" | "MATERIALIZED VIEW" => TableKind::View,
            _ => TableKind::Other,
        }
    }
}

impl FromStr for TableKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "table" => Ok(TableKind::Table),
            "view" => Ok(TableKind::View),
            "other" => Ok(TableKind::Other),
            other => Err(format!("unknown table kind '{}'", other)),
        }
    }
}

/// Entry of a table listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Table, view or other.
    pub kind: TableKind,
}

impl TableInfo {
    /// Fully qualified name.
    pub fn full_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

/// Foreign key relationship between two tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Constraint name.
    pub name: String,
    /// Referenced (primary) table.
    pub pk_table: String,
    /// Referencing (foreign) table.
    pub fk_table: String,
    /// (primary column, foreign column) pairs in key order.
    pub columns: Vec<(String, String)>,
}

/// A single-use request consumed by the migrator.
#[derive(Debug, Clone, PartialEq)]
pub enum TableChange {
    /// Create the table from scratch.
    Create(Table),
    /// Bring `existing` in line with `desired`.
    Alter { desired: Table, existing: Table },
}

impl TableChange {
    /// The desired table shape.
    pub fn desired(&self) -> &Table {
        match self {
            TableChange::Create(t) => t,
            TableChange::Alter { desired, .. } => desired,
        }
    }
}

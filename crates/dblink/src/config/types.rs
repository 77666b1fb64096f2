//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The backend this link talks to.
    pub data_source: DataSourceConfig,

    /// Paging and page cache behavior.
    #[serde(default)]
    pub paging: PagingConfig,

    /// Schema diffing behavior.
    #[serde(default)]
    pub schema: SchemaConfig,
}

/// Data source configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Name attached to errors and log lines (default: "default").
    #[serde(default = "default_name")]
    pub name: String,

    /// Database type (default: "postgres").
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default depends on the type).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never written back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Default schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode: disable, prefer, require, verify-ca, verify-full (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,
}

impl DataSourceConfig {
    /// Port, falling back to the backend's well-known port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.r#type.to_lowercase().as_str() {
            "mssql" | "sqlserver" | "sql_server" => 1433,
            "mysql" | "mariadb" => 3306,
            _ => 5432,
        })
    }
}

impl fmt::Debug for DataSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceConfig")
            .field("name", &self.name)
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Paging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Rows per page (default: 100).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Pages kept by the page cache before the least recently used is evicted (default: 64).
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Allow scrolling to negative row indices (default: false).
    #[serde(default)]
    pub allow_negative_rows: bool,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            cache_capacity: default_cache_capacity(),
            allow_negative_rows: false,
        }
    }
}

/// Schema diffing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Override the backend's identifier case rule when matching names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,

    /// DDL dialect to render with (default: the data source type).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
}

// Default value functions for serde
fn default_name() -> String {
    "default".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_cache_capacity() -> usize {
    64
}

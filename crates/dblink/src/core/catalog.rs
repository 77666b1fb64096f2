//! Driver catalog for explicit dependency injection.
//!
//! The [`DriverCatalog`] maps backend type names to driver factories and
//! schema dialects. It is constructed explicitly and handed to whatever
//! needs to open links; there is no global registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, DataSourceConfig};
use crate::dialect::{MssqlDialect, MysqlDialect, PostgresDialect, SchemaDialect};
use crate::error::{DbError, Result};
use crate::link::DataLink;

use super::traits::Driver;

/// Builds a driver for one data source.
pub type DriverFactory = Arc<dyn Fn(&DataSourceConfig) -> Arc<dyn Driver> + Send + Sync>;

/// Registry of drivers and schema dialects by canonical backend name.
///
/// ```rust,ignore
/// let catalog = DriverCatalog::with_builtins();
/// let mut link = catalog.create_link(&config.data_source)?;
/// let dialect = catalog.dialect_for(&config)?;
/// ```
#[derive(Default)]
pub struct DriverCatalog {
    drivers: HashMap<String, DriverFactory>,
    dialects: HashMap<String, Arc<dyn SchemaDialect>>,
}

impl DriverCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with the built-in dialects and the drivers enabled
    /// by Cargo features.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();

        catalog.register_dialect("postgres", Arc::new(PostgresDialect::new()));
        catalog.register_dialect("mssql", Arc::new(MssqlDialect::new()));
        catalog.register_dialect("mysql", Arc::new(MysqlDialect::new()));

        #[cfg(feature = "postgres")]
        catalog.register_driver(
            "postgres",
            Arc::new(|config: &DataSourceConfig| {
                Arc::new(crate::drivers::PostgresDriver::new(config.clone())) as Arc<dyn Driver>
            }),
        );

        catalog
    }

    /// Register a driver factory under a backend name.
    pub fn register_driver(&mut self, name: impl Into<String>, factory: DriverFactory) {
        self.drivers.insert(name.into(), factory);
    }

    /// Register a schema dialect under a backend name.
    pub fn register_dialect(&mut self, name: impl Into<String>, dialect: Arc<dyn SchemaDialect>) {
        self.dialects.insert(name.into(), dialect);
    }

    /// Check if a driver is registered.
    pub fn has_driver(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Check if a dialect is registered.
    pub fn has_dialect(&self, name: &str) -> bool {
        self.dialects.contains_key(name)
    }

    /// Registered driver names, sorted.
    pub fn driver_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the driver for a data source.
    pub fn driver_for(&self, config: &DataSourceConfig) -> Result<Arc<dyn Driver>> {
        let db_type = Self::normalize_db_type(&config.r#type)?;
        let factory = self.drivers.get(db_type).ok_or_else(|| {
            DbError::Config(format!(
                "No driver registered for database type '{}'. Available drivers: {}",
                db_type,
                self.driver_names().join(", ")
            ))
        })?;
        Ok(factory(config))
    }

    /// Create an unconnected link for a data source.
    pub fn create_link(&self, config: &DataSourceConfig) -> Result<DataLink> {
        Ok(DataLink::new(config.name.clone(), self.driver_for(config)?))
    }

    /// Get a dialect by name or alias.
    pub fn require_dialect(&self, name: &str) -> Result<Arc<dyn SchemaDialect>> {
        let canonical = Self::normalize_db_type(name)?;
        self.dialects
            .get(canonical)
            .cloned()
            .ok_or_else(|| DbError::Config(format!("Unknown schema dialect: {}", name)))
    }

    /// The dialect for a configuration: `schema.dialect` if set, otherwise
    /// the data source type.
    pub fn dialect_for(&self, config: &Config) -> Result<Arc<dyn SchemaDialect>> {
        let name = config
            .schema
            .dialect
            .as_deref()
            .unwrap_or(&config.data_source.r#type);
        self.require_dialect(name)
    }

    /// Canonical database type for an alias.
    ///
    /// - "postgres", "postgresql", "pg" → "postgres"
    /// - "mssql", "sqlserver", "sql_server" → "mssql"
    /// - "mysql", "mariadb" → "mysql"
    pub fn normalize_db_type(db_type: &str) -> Result<&'static str> {
        match db_type.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok("postgres"),
            "mssql" | "sqlserver" | "sql_server" => Ok("mssql"),
            "mysql" | "mariadb" => Ok("mysql"),
            other => Err(DbError::Config(format!(
                "Unknown database type: '{}'. Supported types: postgres, mssql, mysql",
                other
            ))),
        }
    }
}

impl std::fmt::Debug for DriverCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dialects: Vec<&str> = self.dialects.keys().map(String::as_str).collect();
        dialects.sort_unstable();
        f.debug_struct("DriverCatalog")
            .field("drivers", &self.driver_names())
            .field("dialects", &dialects)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::Capabilities;
    use crate::testing::MockBackend;

    fn config(db_type: &str) -> Config {
        Config::from_yaml(&format!(
            r#"
data_source:
  name: warehouse
  type: {db_type}
  host: localhost
  database: app
  user: app
"#
        ))
        .unwrap()
    }

    #[test]
    fn test_normalize_db_type() {
        assert_eq!(DriverCatalog::normalize_db_type("PostgreSQL").unwrap(), "postgres");
        assert_eq!(DriverCatalog::normalize_db_type("sql_server").unwrap(), "mssql");
        assert_eq!(DriverCatalog::normalize_db_type("mariadb").unwrap(), "mysql");
        assert!(DriverCatalog::normalize_db_type("oracle").is_err());
    }

    #[test]
    fn test_builtins_register_all_dialects() {
        let catalog = DriverCatalog::with_builtins();
        for name in ["postgres", "mssql", "mysql"] {
            assert!(catalog.has_dialect(name), "{name}");
        }
        assert_eq!(catalog.require_dialect("pg").unwrap().name(), "postgres");
    }

    #[test]
    fn test_dialect_override_wins() {
        let catalog = DriverCatalog::with_builtins();
        let mut cfg = config("postgres");
        assert_eq!(catalog.dialect_for(&cfg).unwrap().name(), "postgres");
        cfg.schema.dialect = Some("mysql".into());
        assert_eq!(catalog.dialect_for(&cfg).unwrap().name(), "mysql");
    }

    #[test]
    fn test_missing_driver_is_config_error() {
        let catalog = DriverCatalog::new();
        let err = catalog.create_link(&config("mssql").data_source).unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }

    #[tokio::test]
    async fn test_registered_driver_backs_link() {
        let backend = MockBackend::new(Capabilities::default());
        let driver = backend.driver();
        let mut catalog = DriverCatalog::new();
        catalog.register_driver("mssql", Arc::new(move |_: &DataSourceConfig| driver.clone()));

        let mut link = catalog.create_link(&config("sqlserver").data_source).unwrap();
        assert_eq!(link.name(), "warehouse");
        link.ping().await.unwrap();
        assert!(link.is_connected());
    }
}

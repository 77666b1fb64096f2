//! Configuration validation.

use super::Config;
use crate::dialect::DialectImpl;
use crate::error::{DbError, Result};

const SSL_MODES: &[&str] = &["disable", "prefer", "require", "verify-ca", "verify-full"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let ds = &config.data_source;

    if ds.name.is_empty() {
        return Err(DbError::Config("data_source.name is required".into()));
    }
    if ds.host.is_empty() {
        return Err(DbError::Config("data_source.host is required".into()));
    }
    if ds.database.is_empty() {
        return Err(DbError::Config("data_source.database is required".into()));
    }
    if ds.user.is_empty() {
        return Err(DbError::Config("data_source.user is required".into()));
    }
    if DialectImpl::from_db_type(&ds.r#type).is_err() {
        return Err(DbError::Config(format!(
            "data_source.type must be one of postgres, mssql, mysql; got '{}'",
            ds.r#type
        )));
    }
    if !SSL_MODES.contains(&ds.ssl_mode.to_lowercase().as_str()) {
        return Err(DbError::Config(format!(
            "data_source.ssl_mode must be one of {}; got '{}'",
            SSL_MODES.join(", "),
            ds.ssl_mode
        )));
    }

    if config.paging.page_size == 0 {
        return Err(DbError::Config("paging.page_size must be at least 1".into()));
    }
    if config.paging.cache_capacity == 0 {
        return Err(DbError::Config(
            "paging.cache_capacity must be at least 1".into(),
        ));
    }

    if let Some(dialect) = &config.schema.dialect {
        DialectImpl::from_db_type(dialect)?;
    }

    Ok(())
}

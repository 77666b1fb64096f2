//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

/// Environment variable consulted when the config file carries no password.
pub const PASSWORD_ENV: &str = "DBLINK_PASSWORD";

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(yaml)?;
        if config.data_source.password.is_empty() {
            if let Ok(password) = std::env::var(PASSWORD_ENV) {
                config.data_source.password = password;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Render the configuration as YAML, without the password.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
data_source:
  name: warehouse
  host: db.internal
  database: sales
  user: reporter
  password: hunter2
  ssl_mode: disable
paging:
  page_size: 25
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.data_source.r#type, "postgres");
        assert_eq!(config.data_source.port(), 5432);
        assert_eq!(config.data_source.schema, "public");
        assert_eq!(config.paging.page_size, 25);
        assert_eq!(config.paging.cache_capacity, 64);
        assert!(!config.paging.allow_negative_rows);
        assert_eq!(config.schema.case_sensitive, None);
    }

    #[test]
    fn test_to_yaml_omits_password() {
        let config = Config::from_yaml(YAML).unwrap();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("db.internal"));
        assert!(!yaml.contains("hunter2"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.data_source.name, "warehouse");
    }

    #[test]
    fn test_invalid_yaml_is_yaml_error() {
        let err = Config::from_yaml("data_source: [").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}

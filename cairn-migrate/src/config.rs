//! Engine configuration.
//!
//! A [`MigratorConfig`] names the target database and the collection that
//! holds the ledger. It can be built in code or read from TOML:
//!
//! ```toml
//! database = "shop"
//! ledger_collection = "cairn_migrations"   # optional
//! ```
//!
//! String values may reference environment variables as `${NAME}`; unset
//! variables are left as written.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};

/// Ledger collection used when none is configured.
pub const DEFAULT_LEDGER_COLLECTION: &str = "cairn_migrations";

fn default_ledger_collection() -> String {
    DEFAULT_LEDGER_COLLECTION.to_string()
}

/// Configuration for a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigratorConfig {
    /// Name of the target database.
    pub database: String,
    /// Collection in the target database that records applied migrations.
    #[serde(default = "default_ledger_collection")]
    pub ledger_collection: String,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            database: String::new(),
            ledger_collection: default_ledger_collection(),
        }
    }
}

impl MigratorConfig {
    /// Create a configuration targeting `database`.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Set the ledger collection name.
    pub fn ledger_collection(mut self, name: impl Into<String>) -> Self {
        self.ledger_collection = name.into();
        self
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> MigrateResult<Self> {
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)
            .map_err(|e| MigrationError::config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Check that both names are usable.
    pub fn validate(&self) -> MigrateResult<()> {
        if self.database.trim().is_empty() {
            return Err(MigrationError::config("database name is empty"));
        }
        if self.ledger_collection.trim().is_empty() {
            return Err(MigrationError::config("ledger collection name is empty"));
        }
        Ok(())
    }
}

fn expand_env_vars(content: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return content.to_string();
    };

    let mut result = content.to_string();
    for cap in re.captures_iter(content) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = MigratorConfig::default();
        assert_eq!(config.ledger_collection, DEFAULT_LEDGER_COLLECTION);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = MigratorConfig::new("shop").ledger_collection("shop_migrations");
        assert_eq!(config.database, "shop");
        assert_eq!(config.ledger_collection, "shop_migrations");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal() {
        let config = MigratorConfig::from_toml_str(r#"database = "shop""#).unwrap();
        assert_eq!(config, MigratorConfig::new("shop"));
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let err = MigratorConfig::from_toml_str(
            r#"
            database = "shop"
            endpoint = "http://localhost:8529"
            "#,
        )
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_parse_rejects_empty_ledger() {
        let err = MigratorConfig::from_toml_str(
            r#"
            database = "shop"
            ledger_collection = ""
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ledger collection"));
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("CAIRN_TEST_CONFIG_DB", "inventory");
        }

        let config = MigratorConfig::from_toml_str(
            r#"
            database = "${CAIRN_TEST_CONFIG_DB}"
            ledger_collection = "${CAIRN_TEST_CONFIG_UNSET}"
            "#,
        )
        .unwrap();
        assert_eq!(config.database, "inventory");
        assert_eq!(config.ledger_collection, "${CAIRN_TEST_CONFIG_UNSET}");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database = \"shop\"").unwrap();
        writeln!(file, "ledger_collection = \"applied\"").unwrap();

        let config = MigratorConfig::from_file(file.path()).unwrap();
        assert_eq!(config, MigratorConfig::new("shop").ledger_collection("applied"));

        let err = MigratorConfig::from_file("/nonexistent/cairn.toml").unwrap_err();
        assert!(err.is_config_error());
    }
}

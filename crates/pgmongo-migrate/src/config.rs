//! Configuration types for pgmongo-migrate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main migration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Source PostgreSQL configuration.
    pub postgres: PostgresConfig,
    /// Destination MongoDB configuration.
    pub mongodb: MongoConfig,
    /// Migration options.
    #[serde(default)]
    pub options: MigrationOptions,
}

/// PostgreSQL source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Server host name.
    pub host: String,
    /// Server port.
    #[serde(default = "default_pg_port")]
    pub port: u16,
    /// Database name.
    pub database: String,
    /// User name.
    pub user: String,
    /// Password (may also come from `PGPASSWORD`).
    #[serde(default)]
    pub password: String,
    /// Schema searched when discovering tables and qualifying table names.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Tables to migrate, in order. Ignored when `all_tables` is set.
    ///
    /// Each name is quoted exactly as written and looked up in `schema`:
    /// `Users` does not match a table created as `users`, and
    /// `sales.orders` names a table with a dot in its name rather than
    /// `orders` in schema `sales`. Set `schema` to read another schema.
    #[serde(default)]
    pub tables: Vec<String>,
    /// Migrate every base table of `schema`.
    #[serde(default)]
    pub all_tables: bool,
}

/// MongoDB destination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    /// Connection URI (`mongodb://` or `mongodb+srv://`).
    pub uri: String,
    /// Database receiving one collection per table.
    pub database: String,
}

/// Migration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Number of tables transferred concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Dry run mode (read everything, write nothing).
    #[serde(default)]
    pub dry_run: bool,
    /// Cancel the run after this many seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Retries when establishing connections.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            dry_run: false,
            timeout_secs: None,
            connect_retries: default_connect_retries(),
        }
    }
}

impl MigrationOptions {
    /// Run deadline, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_workers() -> usize {
    1
}

fn default_connect_retries() -> u32 {
    3
}

impl MigrationConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML does not match the configuration layout.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        let pg = &self.postgres;
        if pg.host.trim().is_empty() {
            return Err(Error::Config("postgres.host cannot be empty".to_string()));
        }
        if pg.port == 0 {
            return Err(Error::Config("postgres.port must be greater than 0".to_string()));
        }
        if pg.database.trim().is_empty() {
            return Err(Error::Config("postgres.database cannot be empty".to_string()));
        }
        if pg.user.trim().is_empty() {
            return Err(Error::Config("postgres.user cannot be empty".to_string()));
        }
        if pg.schema.trim().is_empty() {
            return Err(Error::Config("postgres.schema cannot be empty".to_string()));
        }
        if pg.max_connections == 0 {
            return Err(Error::Config(
                "postgres.max_connections must be greater than 0".to_string(),
            ));
        }
        if !pg.all_tables {
            if pg.tables.is_empty() {
                return Err(Error::Config(
                    "postgres.tables cannot be empty unless all_tables is set".to_string(),
                ));
            }
            if pg.tables.iter().any(|t| t.trim().is_empty()) {
                return Err(Error::Config(
                    "postgres.tables contains an empty table name".to_string(),
                ));
            }
        }

        validate_mongo_uri(&self.mongodb.uri)?;
        if self.mongodb.database.trim().is_empty() {
            return Err(Error::Config("mongodb.database cannot be empty".to_string()));
        }

        if self.options.workers == 0 {
            return Err(Error::Config(
                "options.workers must be greater than 0".to_string(),
            ));
        }
        // Every worker holds one pooled connection while its table streams.
        if self.options.workers > pg.max_connections as usize {
            return Err(Error::Config(format!(
                "options.workers ({}) exceeds postgres.max_connections ({})",
                self.options.workers, pg.max_connections
            )));
        }
        Ok(())
    }
}

/// Checks that a MongoDB URI uses a supported scheme.
pub fn validate_mongo_uri(uri: &str) -> Result<()> {
    let valid_schemes = ["mongodb://", "mongodb+srv://"];
    let scheme = valid_schemes.iter().find(|s| uri.starts_with(*s));

    match scheme {
        Some(s) if uri.len() > s.len() => Ok(()),
        Some(_) => Err(Error::Config(format!("MongoDB URI has no host: '{}'", uri))),
        None => Err(Error::Config(format!(
            "Invalid MongoDB URI scheme in '{}'. Allowed: mongodb, mongodb+srv",
            uri
        ))),
    }
}

/// Example configuration written by `pgmongo-migrate init`.
pub const EXAMPLE_CONFIG: &str = r#"# pgmongo-migrate configuration
postgres:
  host: localhost
  port: 5432
  database: app
  user: app
  password: secret  # or set PGPASSWORD
  schema: public
  max_connections: 10  # must be at least options.workers
  # Names are quoted exactly: case is kept and a dot is part of the name.
  # Tables in another schema are selected with `schema`, not `sales.orders`.
  tables:
    - users
    - orders
  all_tables: false  # true = every base table in `schema`, `tables` is ignored

mongodb:
  uri: mongodb://localhost:27017
  database: app_export

options:
  workers: 1  # tables transferred concurrently
  dry_run: false
  # timeout_secs: 3600
  connect_retries: 3
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> MigrationConfig {
        MigrationConfig::from_yaml(EXAMPLE_CONFIG).unwrap()
    }

    #[test]
    fn test_options_defaults() {
        let options = MigrationOptions::default();
        assert_eq!(options.workers, 1);
        assert_eq!(options.connect_retries, 3);
        assert!(!options.dry_run);
        assert!(options.timeout().is_none());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.postgres.tables, vec!["users", "orders"]);
        assert_eq!(config.mongodb.database, "app_export");
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
postgres:
  host: db.internal
  database: shop
  user: reader
  password: pw
  tables: [users]
mongodb:
  uri: mongodb://mongo:27017
  database: shop
"#;
        let config = MigrationConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.postgres.port, 5432);
        assert_eq!(config.postgres.schema, "public");
        assert_eq!(config.postgres.max_connections, 10);
        assert!(!config.postgres.all_tables);
        assert_eq!(config.options.workers, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_all_tables_allows_empty_list() {
        let mut config = valid_config();
        config.postgres.tables.clear();
        assert!(config.validate().is_err());

        config.postgres.all_tables = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_table_name() {
        let mut config = valid_config();
        config.postgres.tables.push("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = valid_config();
        config.options.workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_validate_rejects_more_workers_than_connections() {
        // Arrange
        let mut config = valid_config();
        config.postgres.max_connections = 2;
        config.options.workers = 2;
        assert!(config.validate().is_ok());

        // Act
        config.options.workers = 3;
        let err = config.validate().unwrap_err();

        // Assert
        assert_eq!(err.code(), "MIG-001");
        assert!(err.to_string().contains("max_connections"), "{err}");
    }

    #[test]
    fn test_example_config_documents_exact_table_names() {
        assert!(EXAMPLE_CONFIG.contains("quoted exactly"));
        assert_eq!(valid_config().postgres.max_connections, 10);
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = valid_config();
        config.postgres.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mongo_uri_validation() {
        assert!(validate_mongo_uri("mongodb://localhost:27017").is_ok());
        assert!(validate_mongo_uri("mongodb+srv://cluster0.example.net").is_ok());
        assert!(validate_mongo_uri("mongodb://").is_err());
        assert!(validate_mongo_uri("http://localhost:27017").is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let err = MigrationConfig::from_file(std::path::Path::new("/nonexistent/config.yml"))
            .unwrap_err();
        assert_eq!(err.code(), "MIG-001");
    }

    #[test]
    fn test_from_file_roundtrip() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXAMPLE_CONFIG.as_bytes()).unwrap();

        let config = MigrationConfig::from_file(file.path()).unwrap();
        assert_eq!(config.postgres.host, "localhost");
    }
}

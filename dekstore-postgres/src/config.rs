//! PostgreSQL Configuration Module
//!
//! Connection and pool settings for [`PgDurableStore`](crate::PgDurableStore),
//! loaded from environment variables with development defaults.

use std::time::Duration;

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use dekstore_core::{BackendError, ConfigError};
use secrecy::{ExposeSecret, SecretString};
use tokio_postgres::NoTls;

/// Default table holding encrypted data keys.
pub const DEFAULT_TABLE: &str = "encrypted_data_keys";

/// Postgres identifiers are truncated beyond this many bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct PgConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password, redacted from `Debug` output
    pub password: SecretString,
    /// Maximum pool size
    pub max_size: usize,
    /// How long to wait for a pooled connection
    pub timeout: Duration,
    /// Table name, optionally schema-qualified (`schema.table`)
    pub table: String,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "dekstore".to_string(),
            user: "postgres".to_string(),
            password: SecretString::new(String::new().into()),
            max_size: 16,
            timeout: Duration::from_secs(30),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl PgConfig {
    /// Create PgConfig from environment variables.
    ///
    /// Environment variables:
    /// - `DEKSTORE_DB_HOST` (default: localhost)
    /// - `DEKSTORE_DB_PORT` (default: 5432)
    /// - `DEKSTORE_DB_NAME` (default: dekstore)
    /// - `DEKSTORE_DB_USER` (default: postgres)
    /// - `DEKSTORE_DB_PASSWORD` (default: empty)
    /// - `DEKSTORE_DB_POOL_SIZE` (default: 16)
    /// - `DEKSTORE_DB_TIMEOUT_SECS` (default: 30)
    /// - `DEKSTORE_DB_TABLE` (default: encrypted_data_keys)
    ///
    /// Unparseable numbers are an error rather than a silent default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            host: std::env::var("DEKSTORE_DB_HOST").unwrap_or(defaults.host),
            port: env_parse("DEKSTORE_DB_PORT")?.unwrap_or(defaults.port),
            dbname: std::env::var("DEKSTORE_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("DEKSTORE_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("DEKSTORE_DB_PASSWORD")
                .map(|p| SecretString::new(p.into()))
                .unwrap_or(defaults.password),
            max_size: env_parse("DEKSTORE_DB_POOL_SIZE")?.unwrap_or(defaults.max_size),
            timeout: env_parse("DEKSTORE_DB_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            table: std::env::var("DEKSTORE_DB_TABLE").unwrap_or(defaults.table),
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the maximum pool size.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "host".to_string(),
            });
        }
        if self.max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_size".to_string(),
                value: "0".to_string(),
                reason: "pool needs at least one connection".to_string(),
            });
        }
        validate_table_name(&self.table)
    }

    /// Create a connection pool from this configuration.
    ///
    /// Connections are opened lazily, so this succeeds without a reachable
    /// server.
    pub fn create_pool(&self) -> Result<Pool, BackendError> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.expose_secret().to_string());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool = PoolConfig::new(self.max_size);
        pool.timeouts.wait = Some(self.timeout);
        pool.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| BackendError::Connection {
                reason: format!("failed to create pool: {e}"),
            })
    }
}

/// Check that `table` can be spliced into SQL unquoted.
///
/// Accepts `name` or `schema.name`, where each part starts with a letter or
/// underscore and continues with ASCII letters, digits or underscores.
pub fn validate_table_name(table: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        field: "table".to_string(),
        value: table.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 {
        return Err(invalid("at most one schema qualifier is allowed"));
    }
    for part in parts {
        let mut chars = part.chars();
        match chars.next() {
            None => return Err(invalid("identifier must not be empty")),
            Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
                return Err(invalid("identifier must start with a letter or underscore"))
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid("identifier may only contain letters, digits and underscores"));
        }
        if part.len() > MAX_IDENTIFIER_LEN {
            return Err(invalid("identifier is longer than 63 bytes"));
        }
    }
    Ok(())
}

fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

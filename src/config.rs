//! Configuration for grain storage providers.
//!
//! Supports:
//! - [`StorageOptions`] built in code, one per named provider
//! - CLI arguments and environment variables via clap ([`Config`])
//! - Validation before any grain traffic is served

use clap::Args;
use std::time::Duration;
use thiserror::Error;

/// Name of the provider used when a grain does not ask for a specific one.
pub const DEFAULT_PROVIDER_NAME: &str = "Default";

/// Lifecycle stage at which application-level services start.
pub const APPLICATION_SERVICES: i32 = 10_000;

/// Error type for provider configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid storage options for provider \"{name}\": connection string is required")]
    MissingConnectionString { name: String },

    #[error("Invalid storage options for provider \"{name}\": in-memory database {target:?} is not shared between pooled connections; use a file path")]
    InMemoryDatabase { name: String, target: String },

    #[error("Invalid storage options: provider name cannot be empty")]
    MissingName,

    #[error("Invalid storage options for provider \"{name}\": {field} must be greater than zero")]
    ZeroSize { name: String, field: &'static str },

    #[error("Duplicate storage provider name \"{0}\"")]
    DuplicateName(String),
}

/// Options for one named grain storage provider.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Provider name grains use to select this store
    pub name: String,
    /// SQLite database path
    pub connection_string: String,
    /// Route reads through read-only connections
    pub use_read_only_intent: bool,
    /// Lifecycle stage at which the provider starts
    pub init_stage: i32,
    /// Maximum number of read-write connections
    pub pool_size: u32,
    /// Maximum number of read-only connections
    pub reader_pool_size: u32,
    /// How long a statement waits on a locked database
    pub busy_timeout: Duration,
}

impl StorageOptions {
    /// Create options for a named provider backed by the given database.
    pub fn new(name: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection_string: connection_string.into(),
            ..Self::default()
        }
    }

    /// Check that the options can build a working provider.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingName);
        }
        if self.connection_string.trim().is_empty() {
            return Err(ConfigError::MissingConnectionString {
                name: self.name.clone(),
            });
        }
        if is_in_memory(&self.connection_string) {
            return Err(ConfigError::InMemoryDatabase {
                name: self.name.clone(),
                target: self.connection_string.clone(),
            });
        }
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroSize {
                name: self.name.clone(),
                field: "pool_size",
            });
        }
        if self.use_read_only_intent && self.reader_pool_size == 0 {
            return Err(ConfigError::ZeroSize {
                name: self.name.clone(),
                field: "reader_pool_size",
            });
        }
        Ok(())
    }
}

/// SQLite gives every connection its own private in-memory database.
fn is_in_memory(connection_string: &str) -> bool {
    let target = connection_string.trim();
    target == ":memory:"
        || target.starts_with("file::memory:")
        || (target.starts_with("file:") && target.contains("mode=memory"))
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROVIDER_NAME.into(),
            connection_string: String::new(),
            use_read_only_intent: false,
            init_stage: APPLICATION_SERVICES,
            pool_size: 4,
            reader_pool_size: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Storage provider settings from CLI arguments and environment.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Provider name
    #[arg(long, env = "GRAINSTORE_NAME", default_value = DEFAULT_PROVIDER_NAME)]
    pub name: String,

    /// Path to the SQLite database
    #[arg(short, long, env = "GRAINSTORE_DATABASE", default_value = "./grainstore.db")]
    pub database: String,

    /// Route reads through read-only connections
    #[arg(long, env = "GRAINSTORE_READ_ONLY_INTENT")]
    pub read_only_intent: bool,

    /// Size of the read-write connection pool
    #[arg(long, env = "GRAINSTORE_POOL_SIZE", default_value_t = 4)]
    pub pool_size: u32,

    /// Size of the read-only connection pool
    #[arg(long, env = "GRAINSTORE_READER_POOL_SIZE", default_value_t = 8)]
    pub reader_pool_size: u32,

    /// Busy timeout in milliseconds
    #[arg(long, env = "GRAINSTORE_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,
}

impl Config {
    /// Convert CLI settings into provider options.
    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            name: self.name.clone(),
            connection_string: self.database.clone(),
            use_read_only_intent: self.read_only_intent,
            init_stage: APPLICATION_SERVICES,
            pool_size: self.pool_size,
            reader_pool_size: self.reader_pool_size,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = StorageOptions::default();
        assert_eq!(options.name, "Default");
        assert_eq!(options.init_stage, APPLICATION_SERVICES);
        assert!(!options.use_read_only_intent);
    }

    #[test]
    fn test_blank_connection_string_rejected() {
        let options = StorageOptions::new("accounts", "   ");
        let err = options.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingConnectionString { ref name } if name == "accounts"));
        assert!(err.to_string().contains("\"accounts\""));
    }

    #[test]
    fn test_in_memory_targets_rejected() {
        for target in [":memory:", "file::memory:?cache=shared", "file:grains?mode=memory"] {
            let err = StorageOptions::new("carts", target).validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::InMemoryDatabase { ref name, .. } if name == "carts"),
                "{target} accepted"
            );
        }
        assert!(StorageOptions::new("carts", "./memory.db").validate().is_ok());
    }

    #[test]
    fn test_zero_pool_rejected() {
        let mut options = StorageOptions::new("accounts", "/tmp/accounts.db");
        options.pool_size = 0;
        assert!(matches!(
            options.validate(),
            Err(ConfigError::ZeroSize { field: "pool_size", .. })
        ));
    }

    #[test]
    fn test_reader_pool_only_checked_with_read_intent() {
        let mut options = StorageOptions::new("accounts", "/tmp/accounts.db");
        options.reader_pool_size = 0;
        assert!(options.validate().is_ok());

        options.use_read_only_intent = true;
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_config_to_options() {
        let config = Config {
            name: "carts".into(),
            database: "/var/lib/carts.db".into(),
            read_only_intent: true,
            pool_size: 2,
            reader_pool_size: 3,
            busy_timeout_ms: 250,
        };
        let options = config.storage_options();
        assert_eq!(options.name, "carts");
        assert_eq!(options.connection_string, "/var/lib/carts.db");
        assert!(options.use_read_only_intent);
        assert_eq!(options.busy_timeout, Duration::from_millis(250));
        assert!(options.validate().is_ok());
    }
}

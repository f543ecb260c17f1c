//! Configuration for the chatkeep service.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{StoreError, StoreResult};

/// Environment variable naming an optional JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "CHATKEEP_CONFIG";
/// Environment override for `server.host`.
pub const HOST_ENV: &str = "CHATKEEP_HOST";
/// Environment override for `server.port`.
pub const PORT_ENV: &str = "CHATKEEP_PORT";
/// Environment override for `storage.sqlite_path`.
pub const DATABASE_ENV: &str = "CHATKEEP_DB";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Conversation listing settings.
    pub listing: ListingConfig,
}

impl AppConfig {
    /// Load configuration from `CHATKEEP_CONFIG` (if set), then apply
    /// environment overrides and validate.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an override is
    /// malformed, or validation fails.
    pub fn from_env() -> StoreResult<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(host) = std::env::var(HOST_ENV) {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var(PORT_ENV) {
            config.server.port = port.parse().map_err(|_| {
                StoreError::InvalidConfig(format!("{PORT_ENV} is not a valid port: {port:?}"))
            })?;
        }
        if let Ok(path) = std::env::var(DATABASE_ENV) {
            config.storage.sqlite_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration file. Missing sections keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> StoreResult<()> {
        if self.server.port == 0 {
            return Err(StoreError::InvalidConfig(
                "server.port must be > 0".to_string(),
            ));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(StoreError::InvalidConfig(
                "server.request_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.listing.default_limit == 0 {
            return Err(StoreError::InvalidConfig(
                "listing.default_limit must be > 0".to_string(),
            ));
        }

        if self.listing.default_limit > self.listing.max_limit {
            return Err(StoreError::InvalidConfig(format!(
                "listing.default_limit ({}) must not exceed listing.max_limit ({})",
                self.listing.default_limit, self.listing.max_limit
            )));
        }

        for (key, table) in [
            ("storage.conversation_table", &self.storage.conversation_table),
            ("storage.preference_table", &self.storage.preference_table),
        ] {
            if !is_sql_identifier(table) {
                return Err(StoreError::InvalidConfig(format!(
                    "{key} must be a plain SQL identifier, got {table:?}"
                )));
            }
        }

        if self.storage.conversation_table == self.storage.preference_table {
            return Err(StoreError::InvalidConfig(
                "storage.conversation_table and storage.preference_table must differ".to_string(),
            ));
        }

        Ok(())
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Upper bound on the store work of a single request.
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_secs: 10,
        }
    }
}

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Conversation table name.
    pub conversation_table: String,
    /// Preference table name.
    pub preference_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("chatkeep.sqlite"),
            conversation_table: "conversations".to_string(),
            preference_table: "userpreferences".to_string(),
        }
    }
}

/// Conversation listing settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Limit used when a request does not give one.
    pub default_limit: usize,
    /// Largest limit a request may ask for; larger values are clamped.
    pub max_limit: usize,
}

impl ListingConfig {
    /// Effective limit for a requested value.
    #[must_use]
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(0) | None => self.default_limit,
            Some(limit) => limit.min(self.max_limit),
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

//! Operator configuration file handling.
//!
//! TOML format, stored in the service's data directory. These are
//! deployment settings only: the event schemas and on-ledger parameters
//! come from the ledger package, not from this file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default event page size per synchronizer pass
const DEFAULT_PAGE_SIZE: usize = 50;

/// Default storage duration for published blobs
const DEFAULT_EPOCHS: u64 = 5;

/// Service configuration (operator settings only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ledger node connection and polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the ledger node.
    pub rpc_url: String,

    /// Events fetched per event type per pass.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// Storage-network endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Publisher endpoint (register/upload/certify).
    pub publisher_url: Option<String>,

    /// Primary aggregator endpoint (public reads).
    pub aggregator_url: Option<String>,

    /// Fallback aggregator, tried when the primary read fails.
    pub fallback_aggregator_url: Option<String>,

    /// Storage duration for newly published blobs.
    #[serde(default = "default_epochs")]
    pub epochs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            publisher_url: None,
            aggregator_url: None,
            fallback_aggregator_url: None,
            epochs: DEFAULT_EPOCHS,
        }
    }
}

/// Materialized store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" (durable) or "memory" (process-local).
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database file path for the sqlite backend.
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
        }
    }
}

/// REST surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Listen address for the REST surface.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Bearer token required on the /events sync trigger. Leave unset to
    /// keep the trigger open.
    pub sync_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            sync_token: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_epochs() -> u64 {
    DEFAULT_EPOCHS
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: ServiceConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml() -> String {
        r#"# Patronage service configuration (operator settings)
#
# Event schemas and on-ledger parameters are defined by the ledger package;
# this file only controls how this deployment connects and serves.

[ledger]
# JSON-RPC endpoint of the ledger node
rpc_url = "http://127.0.0.1:9000"

# Events fetched per event type per synchronizer pass
page_size = 50

[storage]
# Publisher endpoint (register/upload/certify)
# publisher_url = "http://127.0.0.1:31415"

# Primary aggregator endpoint (public reads)
# aggregator_url = "http://127.0.0.1:31416"

# Fallback aggregator, tried when the primary read fails
# fallback_aggregator_url = "https://aggregator.example.net"

# Storage duration for newly published blobs
epochs = 5

[store]
# "sqlite" (durable) or "memory" (process-local, lost on restart)
backend = "sqlite"

# Database file path for the sqlite backend
# path = "/var/lib/patronage/patronage.db"

[api]
# Listen address for the REST surface
listen_addr = "127.0.0.1:3000"

# Bearer token required on the /events sync trigger.
# Leave commented to keep the trigger open.
# sync_token = "change-me"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"
"#
        .to_string()
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }

    /// Database path, defaulting next to the config file's directory.
    pub fn database_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("patronage.db"))
    }
}

/// Default config file path: ~/.local/share/patronage/config.toml
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

/// Default data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("patronage")
}

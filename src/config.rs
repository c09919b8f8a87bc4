//! Application-level configuration loading: listing limits, transaction timeout and storage backend.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIVIA_CONFIG_PATH";
const DEFAULT_GAMES_LIST_LIMIT: usize = 10;
const DEFAULT_TRANSACTION_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MONGO_URI: &str = "mongodb://localhost:27017";
const DEFAULT_PORT: u16 = 9000;

/// Storage backend selected at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// In-process store, installed immediately.
    Memory,
    /// MongoDB replica set, connected in the background.
    Mongo {
        /// Connection string.
        uri: String,
        /// Database name; the backend default is used when absent.
        database: Option<String>,
    },
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// How many games the games list returns.
    pub games_list_limit: usize,
    /// Upper bound for a gated engine operation.
    pub transaction_timeout: Duration,
    /// Storage backend.
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load the configuration from disk, then apply environment overrides.
    pub fn load() -> Self {
        Self::load_file().with_env_overrides()
    }

    fn load_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        games_list_limit = app_config.games_list_limit,
                        storage = ?app_config.storage,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// `MONGO_URI` selects the Mongo backend; `MONGO_DB` overrides its database name.
    fn with_env_overrides(mut self) -> Self {
        let uri = non_empty_env("MONGO_URI");
        let database = non_empty_env("MONGO_DB");

        self.storage = match (self.storage, uri) {
            (StorageConfig::Mongo { database: file_db, .. }, Some(uri)) => StorageConfig::Mongo {
                uri,
                database: database.or(file_db),
            },
            (StorageConfig::Memory, Some(uri)) => StorageConfig::Mongo { uri, database },
            (StorageConfig::Mongo { uri, database: file_db }, None) => StorageConfig::Mongo {
                uri,
                database: database.or(file_db),
            },
            (StorageConfig::Memory, None) => StorageConfig::Memory,
        };
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            games_list_limit: DEFAULT_GAMES_LIST_LIMIT,
            transaction_timeout: Duration::from_millis(DEFAULT_TRANSACTION_TIMEOUT_MS),
            storage: StorageConfig::Memory,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default = "default_games_list_limit")]
    games_list_limit: usize,
    #[serde(default = "default_transaction_timeout_ms")]
    transaction_timeout_ms: u64,
    #[serde(default)]
    storage: RawStorage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum RawStorage {
    #[default]
    Memory,
    Mongo {
        #[serde(default)]
        uri: Option<String>,
        #[serde(default)]
        database: Option<String>,
    },
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let storage = match value.storage {
            RawStorage::Memory => StorageConfig::Memory,
            RawStorage::Mongo { uri, database } => StorageConfig::Mongo {
                uri: uri.unwrap_or_else(|| DEFAULT_MONGO_URI.to_owned()),
                database,
            },
        };

        Self {
            games_list_limit: value.games_list_limit.max(1),
            transaction_timeout: Duration::from_millis(value.transaction_timeout_ms.max(1)),
            storage,
        }
    }
}

fn default_games_list_limit() -> usize {
    DEFAULT_GAMES_LIST_LIMIT
}

fn default_transaction_timeout_ms() -> u64 {
    DEFAULT_TRANSACTION_TIMEOUT_MS
}

/// Port from `PORT` or `SERVER_PORT`, defaulting to 9000.
pub fn server_port() -> u16 {
    env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

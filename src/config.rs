use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Wardline";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DATA_DIR_ENV: &str = "WARDLINE_DATA_DIR";
pub const BIND_ENV: &str = "WARDLINE_BIND";
pub const DEFAULT_BIND: &str = "127.0.0.1:8480";
const DATABASE_FILE: &str = "wardline.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot determine home directory; set {DATA_DIR_ENV}")]
    NoHomeDir,
    #[error("Invalid bind address {value:?}: {source}")]
    InvalidBind {
        value: String,
        source: std::net::AddrParseError,
    },
}

/// Default data directory: ~/Wardline/ on all platforms.
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(APP_NAME))
        .ok_or(ConfigError::NoHomeDir)
}

/// Log filter used when RUST_LOG is not set.
pub fn default_log_filter() -> &'static str {
    "info,wardline_lib=debug,tower_http=info"
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
}

impl AppConfig {
    /// Reads WARDLINE_DATA_DIR and WARDLINE_BIND, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(
            std::env::var(DATA_DIR_ENV).ok(),
            std::env::var(BIND_ENV).ok(),
        )
    }

    fn from_vars(data_dir: Option<String>, bind: Option<String>) -> Result<Self, ConfigError> {
        let data_dir = match data_dir.filter(|d| !d.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };
        let bind_raw = bind.unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse()
            .map_err(|source| ConfigError::InvalidBind {
                value: bind_raw.clone(),
                source,
            })?;
        Ok(Self { data_dir, bind })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

// ⚙️ Configuration - environment first, `.env` optional, CLI flags override

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DB_PATH_VAR: &str = "CFDI_DB_PATH";
pub const BIND_ADDR_VAR: &str = "CFDI_BIND_ADDR";
pub const INGEST_TIMEOUT_VAR: &str = "CFDI_INGEST_TIMEOUT_SECS";

const DEFAULT_DB_PATH: &str = "catalog.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub bind_addr: String,
    /// Per-document ingestion budget; `None` means unbounded
    pub ingest_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            ingest_timeout: None,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Self {
        // A missing .env file is normal
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = AppConfig::default();
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        AppConfig {
            database_path: value(DB_PATH_VAR).map(PathBuf::from).unwrap_or(defaults.database_path),
            bind_addr: value(BIND_ADDR_VAR).unwrap_or(defaults.bind_addr),
            ingest_timeout: value(INGEST_TIMEOUT_VAR)
                .and_then(|secs| secs.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    pub fn with_database_path(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.database_path = path;
        }
        self
    }

    pub fn with_ingest_timeout_secs(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs {
            self.ingest_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        self
    }
}

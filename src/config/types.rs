use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use madden_db::pool::PoolOptions;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file backing the catalog (default: ./madden.db)
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Maximum pooled connections shared by all components
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a writer waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_size: self.pool_size,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("madden.db")
}

fn default_pool_size() -> u32 {
    PoolOptions::default().max_size
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber` filter directive, e.g. "madden_db=debug".
    /// `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub filter: Option<String>,
}

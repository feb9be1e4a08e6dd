//! Configuration management for the sync bridge
//!
//! Everything is environment-sourced with working defaults, so the bridge
//! can start with no configuration at all and fail at connect time with a
//! clear error rather than at startup.

use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub tracker: TrackerConfig,
    pub library: LibraryConfig,
    pub sync: SyncConfig,
}

/// Bind address for the health/status endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Source store: the reading tracker's SQLite database
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Path to the SQLite file; opened read-only
    pub db_path: String,
}

/// Target store: the library manager's MySQL/MariaDB database
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Poll interval between sync cycles, in seconds
    pub interval_secs: u64,
    /// Library-manager user id that synced sessions and progress belong to
    pub user_id: i64,
    /// Watermark checkpoint file
    pub state_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            tracker: TrackerConfig {
                db_path: "/data/tracker.db".to_string(),
            },
            library: LibraryConfig {
                host: "mariadb".to_string(),
                port: 3306,
                database: "library".to_string(),
                user: "library".to_string(),
                password: String::new(),
            },
            sync: SyncConfig {
                interval_secs: 300,
                user_id: 1,
                state_file: "/config/sync_state.txt".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from the environment. Missing variables fall back
    /// to the defaults above; unparsable numeric values do the same.
    pub fn from_env() -> Self {
        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            tracker: TrackerConfig {
                db_path: env::var("TRACKER_DB").unwrap_or_else(|_| "/data/tracker.db".to_string()),
            },
            library: LibraryConfig {
                host: env::var("LIBRARY_DB_HOST").unwrap_or_else(|_| "mariadb".to_string()),
                port: env::var("LIBRARY_DB_PORT")
                    .unwrap_or_else(|_| "3306".to_string())
                    .parse()
                    .unwrap_or(3306),
                database: env::var("LIBRARY_DB_NAME").unwrap_or_else(|_| "library".to_string()),
                user: env::var("LIBRARY_DB_USER").unwrap_or_else(|_| "library".to_string()),
                password: env::var("LIBRARY_DB_PASSWORD").unwrap_or_default(),
            },
            sync: SyncConfig {
                interval_secs: env::var("SYNC_INTERVAL")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                user_id: env::var("LIBRARY_USER_ID")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .unwrap_or(1),
                state_file: env::var("SYNC_STATE_FILE")
                    .unwrap_or_else(|_| "/config/sync_state.txt".to_string()),
            },
        }
    }
}

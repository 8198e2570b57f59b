//! High-level database interface.

use std::path::PathBuf;

use directories::ProjectDirs;
use lessproxy_core::SettingsStore;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::models::Config;
use crate::connection::SharedConnection;
use crate::repository::ConfigRepo;

/// File name of the settings database.
pub const DB_FILE_NAME: &str = "lessproxy.db";

/// High-level database interface for LessProxy.
#[derive(Clone)]
pub struct Database {
    conn: SharedConnection,
}

impl Database {
    /// Create a new database in the default app data directory.
    pub fn new() -> Result<Self> {
        Self::with_path(Self::default_db_path()?)
    }

    /// Create a new database at a specific path.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening database at: {:?}", path);
        let conn = SharedConnection::open(&path)?;

        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = SharedConnection::in_memory()?;
        Ok(Self { conn })
    }

    /// Get the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "lessproxy", "lessproxy")
            .ok_or_else(|| StorageError::Config("Could not determine app data directory".into()))?;

        Ok(proj_dirs.data_dir().join(DB_FILE_NAME))
    }

    // === Config ===

    /// Get a configuration value.
    pub fn get_config(&self, key: &str) -> Result<Option<Config>> {
        let conn = self.conn.lock();
        ConfigRepo::get(&conn, key)
    }

    /// Set a configuration value.
    pub fn set_config(&self, key: &str, value: &Value) -> Result<()> {
        let conn = self.conn.lock();
        ConfigRepo::set(&conn, key, value)
    }

    /// Delete a configuration value.
    pub fn delete_config(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        ConfigRepo::delete(&conn, key)
    }

    /// Get every stored configuration value.
    pub fn get_all_config(&self) -> Result<Vec<Config>> {
        let conn = self.conn.lock();
        ConfigRepo::get_all(&conn)
    }
}

impl SettingsStore for Database {
    fn get(&self, key: &str) -> lessproxy_core::Result<Option<Value>> {
        Ok(self.get_config(key)?.map(|config| config.value))
    }

    fn set(&self, key: &str, value: &Value) -> lessproxy_core::Result<()> {
        debug!(key, %value, "Writing setting");
        Ok(self.set_config(key, value)?)
    }
}

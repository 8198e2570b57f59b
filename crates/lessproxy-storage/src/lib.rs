//! LessProxy Storage - SQLite persistence layer.
//!
//! Settings live in a single `config` table of JSON-encoded values, one row
//! per key. [`Database`] implements [`lessproxy_core::SettingsStore`], so the
//! controller and the CLI read and write the same file.
//!
//! # Example
//!
//! ```no_run
//! use lessproxy_core::{ProxyMode, Settings};
//! use lessproxy_storage::Database;
//!
//! let db = Database::new().unwrap();
//! Settings::save_mode(&db, ProxyMode::Direct).unwrap();
//! assert_eq!(Settings::load(&db).unwrap().proxy_mode, ProxyMode::Direct);
//! ```

mod connection;
mod database;
pub mod error;
pub mod models;
pub mod repository;
mod schema;

pub use connection::SharedConnection;
pub use database::{Database, DB_FILE_NAME};
pub use error::{Result, StorageError};
pub use models::Config;
pub use repository::ConfigRepo;

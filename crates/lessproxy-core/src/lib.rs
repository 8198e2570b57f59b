//! LessProxy Core - proxy mode control, PAC loading, and reconnect scheduling.
//!
//! This crate holds the background controller and everything it decides on:
//!
//! - Proxy modes (`direct` / `smart`) and the configuration each maps to
//! - Persisted settings and their validation
//! - Fetching the remote PAC script, with a built-in fallback
//! - Connectivity checks and the status broadcast
//! - The periodic reconnect alarm
//!
//! Host capabilities (settings storage, proxy enforcement, HTTP) sit behind
//! traits so the controller runs the same way under tests and in the app.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lessproxy_core::{Controller, HttpRemote, MemoryStore, ProxyMode};
//! # use lessproxy_core::{ProxyBackend, ProxyConfig};
//! # struct Noop;
//! # #[async_trait::async_trait]
//! # impl ProxyBackend for Noop {
//! #     async fn apply(&self, _: &ProxyConfig) -> lessproxy_core::Result<()> { Ok(()) }
//! #     fn name(&self) -> &'static str { "noop" }
//! # }
//!
//! # async fn run() -> lessproxy_core::Result<()> {
//! let remote = Arc::new(HttpRemote::new()?);
//! let (handle, _task) = Controller::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(Noop),
//!     remote.clone(),
//!     remote,
//! )
//! .spawn();
//!
//! handle.boot().await?;
//! handle.set_mode(ProxyMode::Direct).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod controller;
pub mod error;
pub mod mode;
pub mod pac;
pub mod remote;
pub mod schedule;
pub mod settings;
pub mod status;

pub use backend::ProxyBackend;
pub use controller::{Controller, ControllerConfig, ControllerHandle, Message, Reply};
pub use error::{CoreError, Result};
pub use mode::{ProxyConfig, ProxyMode};
pub use pac::{PacFetcher, PacScript, DEFAULT_PAC};
pub use remote::HttpRemote;
pub use schedule::{format_interval, ReconnectAlarm};
pub use settings::{MemoryStore, Settings, SettingsChange, SettingsPatch, SettingsStore};
pub use status::{Broadcast, IpInfo, StatusProbe, StatusReporter, StatusSnapshot};

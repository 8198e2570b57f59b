//! LessProxy Proxy - system proxy backends.
//!
//! Applies the controller's [`lessproxy_core::ProxyConfig`] to the machine:
//!
//! - [`SystemProxyBackend`] points the OS automatic proxy setting at the PAC
//!   script served by the local server, or turns proxying off
//! - [`DryRunBackend`] only publishes the script, leaving OS settings alone
//!
//! Both write the active script into a shared [`PacSlot`] that the server
//! exposes at [`PAC_PATH`].

pub mod backend;
pub mod error;
pub mod pac_slot;
pub mod setup;

pub use backend::{DryRunBackend, SystemProxyBackend, PAC_PATH};
pub use error::{ProxyError, Result};
pub use pac_slot::PacSlot;
pub use setup::{disable_system_proxy, enable_auto_proxy, SetupResult};

//! LessProxy - PAC-driven proxy switching.
//!
//! This crate provides the pieces the `lessproxy` binary's panel commands
//! use:
//!
//! - [`client::PanelClient`] talks to a running `lessproxy serve`
//! - [`render`] formats settings, status, and broadcasts for the terminal
//!
//! # Usage
//!
//! ```no_run
//! use lessproxy_app::client::PanelClient;
//! use lessproxy_core::{Message, ProxyMode};
//!
//! # async fn run() -> lessproxy_app::client::Result<()> {
//! let client = PanelClient::new("http://127.0.0.1:48766")?;
//! client
//!     .send(&Message::ModeChange { mode: ProxyMode::Direct })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod render;

pub use client::{ClientError, EventParser, PanelClient};

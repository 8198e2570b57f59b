//! Application state for the API server.

use lessproxy_core::ControllerHandle;
use lessproxy_proxy::PacSlot;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handle to the running controller.
    pub controller: ControllerHandle,
    /// Script served at `/proxy.pac`.
    pub pac_slot: PacSlot,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(controller: ControllerHandle, pac_slot: PacSlot) -> Self {
        Self {
            controller,
            pac_slot,
        }
    }
}

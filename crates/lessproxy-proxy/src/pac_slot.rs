//! The PAC script currently served to the OS.

use std::sync::Arc;

use lessproxy_core::DEFAULT_PAC;
use parking_lot::RwLock;

#[derive(Debug)]
struct Entry {
    script: String,
    revision: u64,
}

/// Shared holder for the active PAC script.
///
/// Every write bumps the revision, which backends append to the PAC URL so
/// the OS re-downloads the script instead of using its cached copy.
#[derive(Debug, Clone)]
pub struct PacSlot {
    inner: Arc<RwLock<Entry>>,
}

impl PacSlot {
    /// Creates a slot holding the built-in direct script.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Entry {
                script: DEFAULT_PAC.to_string(),
                revision: 0,
            })),
        }
    }

    /// The current script.
    pub fn script(&self) -> String {
        self.inner.read().script.clone()
    }

    /// The current revision.
    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    /// Replaces the script. Returns the new revision.
    pub fn set(&self, script: impl Into<String>) -> u64 {
        let mut entry = self.inner.write();
        entry.script = script.into();
        entry.revision += 1;
        entry.revision
    }
}

impl Default for PacSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_default_script() {
        let slot = PacSlot::new();
        assert_eq!(slot.script(), DEFAULT_PAC);
        assert_eq!(slot.revision(), 0);
    }

    #[test]
    fn test_set_bumps_revision_across_clones() {
        let slot = PacSlot::new();
        let served = slot.clone();

        assert_eq!(slot.set("function FindProxyForURL() { return \"PROXY a:1\"; }"), 1);
        assert_eq!(slot.set("x"), 2);

        assert_eq!(served.script(), "x");
        assert_eq!(served.revision(), 2);
    }
}

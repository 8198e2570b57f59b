//! User settings persisted as flat key-value pairs.
//!
//! Each field of [`Settings`] is stored under its own key in a
//! [`SettingsStore`]. Missing or malformed values fall back to the defaults,
//! so a partially written store always loads.
//!
//! ```
//! use lessproxy_core::settings::{MemoryStore, Settings, SettingsPatch};
//!
//! let store = MemoryStore::new();
//! let mut settings = Settings::load(&store).unwrap();
//! assert!(settings.auto_reconnect);
//!
//! let patch = SettingsPatch {
//!     reconnect_interval_minutes: Some(15),
//!     ..Default::default()
//! };
//! patch.validate().unwrap();
//! settings.apply(&patch);
//! settings.save(&store).unwrap();
//!
//! assert_eq!(Settings::load(&store).unwrap().reconnect_interval_minutes, 15);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::mode::ProxyMode;

/// Store key for the proxy mode.
pub const KEY_PROXY_MODE: &str = "proxy_mode";

/// Store key for the PAC script URL.
pub const KEY_REMOTE_CONFIG_URL: &str = "remote_config_url";

/// Store key for the auto-reconnect toggle.
pub const KEY_AUTO_RECONNECT: &str = "auto_reconnect";

/// Store key for the reconnect interval.
pub const KEY_RECONNECT_INTERVAL: &str = "reconnect_interval_minutes";

/// PAC script location used when none is configured.
pub const DEFAULT_CONFIG_URL: &str = "https://your-proxy-config.com/pac.js";

/// Default reconnect interval (two hours).
pub const DEFAULT_RECONNECT_INTERVAL_MINUTES: u32 = 2 * 60;

/// Interval used when the stored value is zero.
pub const FALLBACK_RECONNECT_INTERVAL_MINUTES: u32 = 5;

/// Host-provided key-value persistence.
pub trait SettingsStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Inserts or replaces a value.
    fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Returns true if the key has been written.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// In-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// User settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Current routing mode.
    pub proxy_mode: ProxyMode,
    /// Where the PAC script is fetched from.
    pub remote_config_url: String,
    /// Whether the reconnect alarm runs in smart mode.
    pub auto_reconnect: bool,
    /// Minutes between automatic reloads.
    pub reconnect_interval_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy_mode: ProxyMode::Smart,
            remote_config_url: DEFAULT_CONFIG_URL.to_string(),
            auto_reconnect: true,
            reconnect_interval_minutes: DEFAULT_RECONNECT_INTERVAL_MINUTES,
        }
    }
}

impl Settings {
    /// Loads settings, using defaults for missing or malformed keys.
    pub fn load(store: &dyn SettingsStore) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            proxy_mode: read_or(store, KEY_PROXY_MODE, defaults.proxy_mode)?,
            remote_config_url: read_or(
                store,
                KEY_REMOTE_CONFIG_URL,
                defaults.remote_config_url,
            )?,
            auto_reconnect: read_or(store, KEY_AUTO_RECONNECT, defaults.auto_reconnect)?,
            reconnect_interval_minutes: read_or(
                store,
                KEY_RECONNECT_INTERVAL,
                defaults.reconnect_interval_minutes,
            )?,
        })
    }

    /// Writes every field.
    pub fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        store.set(KEY_PROXY_MODE, &serde_json::json!(self.proxy_mode))?;
        store.set(
            KEY_REMOTE_CONFIG_URL,
            &Value::String(self.remote_config_url.clone()),
        )?;
        store.set(KEY_AUTO_RECONNECT, &Value::Bool(self.auto_reconnect))?;
        store.set(
            KEY_RECONNECT_INTERVAL,
            &serde_json::json!(self.reconnect_interval_minutes),
        )?;
        Ok(())
    }

    /// Persists only the proxy mode.
    pub fn save_mode(store: &dyn SettingsStore, mode: ProxyMode) -> Result<()> {
        store.set(KEY_PROXY_MODE, &serde_json::json!(mode))
    }

    /// The URL to fetch the PAC script from (blank means the default).
    pub fn effective_config_url(&self) -> &str {
        let url = self.remote_config_url.trim();
        if url.is_empty() {
            DEFAULT_CONFIG_URL
        } else {
            url
        }
    }

    /// Effective reconnect interval in minutes.
    pub fn effective_interval_minutes(&self) -> u32 {
        if self.reconnect_interval_minutes == 0 {
            FALLBACK_RECONNECT_INTERVAL_MINUTES
        } else {
            self.reconnect_interval_minutes
        }
    }

    /// Period between automatic reloads.
    pub fn reconnect_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.effective_interval_minutes()) * 60)
    }

    /// The reconnect alarm may only run in smart mode with auto-reconnect on.
    pub fn should_auto_reconnect(&self) -> bool {
        self.proxy_mode.is_smart() && self.auto_reconnect
    }

    /// Applies a patch, reporting which fields changed.
    pub fn apply(&mut self, patch: &SettingsPatch) -> SettingsChange {
        let mut change = SettingsChange::default();

        if let Some(url) = &patch.remote_config_url {
            let url = url.trim();
            if url != self.remote_config_url {
                self.remote_config_url = url.to_string();
                change.remote_config_url = true;
            }
        }

        if let Some(enabled) = patch.auto_reconnect {
            if enabled != self.auto_reconnect {
                self.auto_reconnect = enabled;
                change.auto_reconnect = true;
            }
        }

        if let Some(minutes) = patch.reconnect_interval_minutes {
            if minutes != self.reconnect_interval_minutes {
                self.reconnect_interval_minutes = minutes;
                change.reconnect_interval = true;
            }
        }

        change
    }
}

fn read_or<T: DeserializeOwned>(store: &dyn SettingsStore, key: &str, default: T) -> Result<T> {
    match store.get(key)? {
        Some(value) => match serde_json::from_value(value) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                warn!(key, error = %e, "Ignoring malformed setting");
                Ok(default)
            }
        },
        None => Ok(default),
    }
}

/// Edits submitted from the settings panel.
///
/// The proxy mode is not part of a patch; it changes only through a mode
/// change message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub remote_config_url: Option<String>,
    pub auto_reconnect: Option<bool>,
    pub reconnect_interval_minutes: Option<u32>,
}

impl SettingsPatch {
    /// Returns true if the patch carries no edits.
    pub fn is_empty(&self) -> bool {
        self.remote_config_url.is_none()
            && self.auto_reconnect.is_none()
            && self.reconnect_interval_minutes.is_none()
    }

    /// Rejects values the controller cannot use.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.remote_config_url {
            let url = url.trim();
            // Blank resets to the default URL.
            if !url.is_empty() {
                let parsed = reqwest::Url::parse(url).map_err(|e| {
                    CoreError::InvalidSettings(format!("remote_config_url: {}", e))
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(CoreError::InvalidSettings(format!(
                        "remote_config_url must be http or https, got {}",
                        parsed.scheme()
                    )));
                }
            }
        }

        if let Some(0) = self.reconnect_interval_minutes {
            return Err(CoreError::InvalidSettings(
                "reconnect_interval_minutes must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Which fields a patch changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub remote_config_url: bool,
    pub auto_reconnect: bool,
    pub reconnect_interval: bool,
}

impl SettingsChange {
    /// Returns true if anything changed.
    pub fn any(&self) -> bool {
        self.remote_config_url || self.auto_reconnect || self.reconnect_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.proxy_mode, ProxyMode::Smart);
        assert_eq!(settings.remote_config_url, DEFAULT_CONFIG_URL);
        assert!(settings.auto_reconnect);
        assert_eq!(settings.reconnect_interval_minutes, 120);
    }

    #[test]
    fn test_load_empty_store_gives_defaults() {
        let store = MemoryStore::new();
        assert_eq!(Settings::load(&store).unwrap(), Settings::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_writes_flat_keys() {
        let store = MemoryStore::new();
        let settings = Settings {
            proxy_mode: ProxyMode::Direct,
            remote_config_url: "http://example.com/pac.js".to_string(),
            auto_reconnect: false,
            reconnect_interval_minutes: 7,
        };
        settings.save(&store).unwrap();

        assert_eq!(store.len(), 4);
        assert_eq!(store.get(KEY_PROXY_MODE).unwrap(), Some(json!("direct")));
        assert_eq!(store.get(KEY_AUTO_RECONNECT).unwrap(), Some(json!(false)));
        assert_eq!(Settings::load(&store).unwrap(), settings);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let store = MemoryStore::new();
        store.set(KEY_PROXY_MODE, &json!("pac_script")).unwrap();
        store.set(KEY_RECONNECT_INTERVAL, &json!("soon")).unwrap();
        store.set(KEY_AUTO_RECONNECT, &json!(false)).unwrap();

        let settings = Settings::load(&store).unwrap();
        assert_eq!(settings.proxy_mode, ProxyMode::Smart);
        assert_eq!(settings.reconnect_interval_minutes, 120);
        assert!(!settings.auto_reconnect);
    }

    #[test]
    fn test_zero_interval_uses_fallback() {
        let settings = Settings {
            reconnect_interval_minutes: 0,
            ..Default::default()
        };
        assert_eq!(settings.effective_interval_minutes(), 5);
        assert_eq!(settings.reconnect_period(), Duration::from_secs(300));
    }

    #[test]
    fn test_blank_url_uses_default() {
        let settings = Settings {
            remote_config_url: "   ".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.effective_config_url(), DEFAULT_CONFIG_URL);
    }

    #[test]
    fn test_should_auto_reconnect_requires_smart_mode() {
        let mut settings = Settings::default();
        assert!(settings.should_auto_reconnect());

        settings.proxy_mode = ProxyMode::Direct;
        assert!(!settings.should_auto_reconnect());

        settings.proxy_mode = ProxyMode::Smart;
        settings.auto_reconnect = false;
        assert!(!settings.should_auto_reconnect());
    }

    #[test]
    fn test_apply_reports_changes() {
        let mut settings = Settings::default();

        let change = settings.apply(&SettingsPatch {
            remote_config_url: Some(" http://pac.local/p.js ".to_string()),
            auto_reconnect: Some(true),
            reconnect_interval_minutes: Some(30),
        });

        assert!(change.remote_config_url);
        assert!(!change.auto_reconnect);
        assert!(change.reconnect_interval);
        assert_eq!(settings.remote_config_url, "http://pac.local/p.js");

        let change = settings.apply(&SettingsPatch::default());
        assert!(!change.any());
    }

    #[test]
    fn test_patch_validation() {
        assert!(SettingsPatch::default().validate().is_ok());

        let ok = SettingsPatch {
            remote_config_url: Some("https://example.com/pac.js".to_string()),
            reconnect_interval_minutes: Some(1),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let blank = SettingsPatch {
            remote_config_url: Some(String::new()),
            ..Default::default()
        };
        assert!(blank.validate().is_ok());

        let bad_scheme = SettingsPatch {
            remote_config_url: Some("ftp://example.com/pac.js".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            bad_scheme.validate(),
            Err(CoreError::InvalidSettings(_))
        ));

        let not_a_url = SettingsPatch {
            remote_config_url: Some("pac.js".to_string()),
            ..Default::default()
        };
        assert!(not_a_url.validate().is_err());

        let zero = SettingsPatch {
            reconnect_interval_minutes: Some(0),
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_patch_deserializes_partial_json() {
        let patch: SettingsPatch = serde_json::from_value(json!({"auto_reconnect": false})).unwrap();
        assert_eq!(patch.auto_reconnect, Some(false));
        assert!(patch.remote_config_url.is_none());
        assert!(!patch.is_empty());
    }
}

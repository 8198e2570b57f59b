//! Proxy modes and the configuration object handed to the proxy backend.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::pac::PacScript;

/// How traffic is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// All traffic bypasses any proxy.
    Direct,

    /// Routing is decided per request by the current PAC script.
    #[default]
    Smart,
}

impl ProxyMode {
    /// Returns true for smart (PAC-driven) mode.
    pub fn is_smart(&self) -> bool {
        matches!(self, Self::Smart)
    }

    /// Returns the mode as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Smart => "smart",
        }
    }

    /// Returns a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Direct => "All traffic connects directly",
            Self::Smart => "Traffic is routed by the PAC script",
        }
    }
}

impl std::fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProxyMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "smart" => Ok(Self::Smart),
            other => Err(CoreError::InvalidMode(other.to_string())),
        }
    }
}

/// Proxy configuration applied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProxyConfig {
    /// Bypass all proxies.
    Direct,

    /// Evaluate the given PAC script per request.
    PacScript {
        /// Script source, passed through unmodified.
        data: String,
    },
}

impl ProxyConfig {
    /// Builds the configuration for `mode` using the current script.
    pub fn for_mode(mode: ProxyMode, pac: &PacScript) -> Self {
        match mode {
            ProxyMode::Direct => Self::Direct,
            ProxyMode::Smart => Self::PacScript {
                data: pac.source().to_string(),
            },
        }
    }

    /// Returns the mode this configuration enforces.
    pub fn mode(&self) -> ProxyMode {
        match self {
            Self::Direct => ProxyMode::Direct,
            Self::PacScript { .. } => ProxyMode::Smart,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pac::DEFAULT_PAC;

    #[test]
    fn test_default_mode_is_smart() {
        assert_eq!(ProxyMode::default(), ProxyMode::Smart);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("direct".parse::<ProxyMode>().unwrap(), ProxyMode::Direct);
        assert_eq!(" Smart ".parse::<ProxyMode>().unwrap(), ProxyMode::Smart);
        assert!(matches!(
            "system".parse::<ProxyMode>(),
            Err(CoreError::InvalidMode(_))
        ));
    }

    #[test]
    fn test_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&ProxyMode::Direct).unwrap(),
            "\"direct\""
        );
        let mode: ProxyMode = serde_json::from_str("\"smart\"").unwrap();
        assert_eq!(mode, ProxyMode::Smart);
        assert!(serde_json::from_str::<ProxyMode>("\"auto\"").is_err());
    }

    #[test]
    fn test_config_for_mode() {
        let pac = PacScript::Default;

        assert_eq!(
            ProxyConfig::for_mode(ProxyMode::Direct, &pac),
            ProxyConfig::Direct
        );

        let config = ProxyConfig::for_mode(ProxyMode::Smart, &pac);
        assert_eq!(
            config,
            ProxyConfig::PacScript {
                data: DEFAULT_PAC.to_string()
            }
        );
        assert_eq!(config.mode(), ProxyMode::Smart);
    }

    #[test]
    fn test_config_wire_format() {
        let json = serde_json::to_value(ProxyConfig::PacScript {
            data: "x".to_string(),
        })
        .unwrap();
        assert_eq!(json["mode"], "pac_script");
        assert_eq!(json["data"], "x");

        let json = serde_json::to_value(ProxyConfig::Direct).unwrap();
        assert_eq!(json["mode"], "direct");
    }
}

//! Terminal output for the panel commands.

use chrono::Local;
use lessproxy_core::settings::DEFAULT_CONFIG_URL;
use lessproxy_core::{format_interval, Broadcast, ProxyMode, Settings, StatusSnapshot};

/// One line describing a mode.
pub fn mode_line(mode: ProxyMode) -> String {
    format!("Proxy mode: {} ({})", mode, mode.description())
}

/// The settings panel.
pub fn settings(settings: &Settings) -> String {
    let url = if settings.remote_config_url.trim().is_empty() {
        format!("(default) {}", DEFAULT_CONFIG_URL)
    } else {
        settings.remote_config_url.clone()
    };

    let reconnect = if settings.auto_reconnect {
        format!(
            "every {}",
            format_interval(settings.effective_interval_minutes())
        )
    } else {
        "off".to_string()
    };

    [
        mode_line(settings.proxy_mode),
        format!("Remote config URL: {}", url),
        format!("Auto reconnect: {}", reconnect),
    ]
    .join("\n")
}

/// The quick panel status block.
pub fn status(snapshot: &StatusSnapshot) -> String {
    let mut lines = Vec::new();

    if let Some(error) = &snapshot.error {
        lines.push(format!("Error: {}", error));
    }

    for (label, value) in [
        ("IP", &snapshot.ip),
        ("ISP", &snapshot.isp),
        ("Country", &snapshot.country),
        ("City", &snapshot.city),
        ("Timezone", &snapshot.timezone),
        ("AS", &snapshot.as_info),
    ] {
        if let Some(value) = value {
            lines.push(format!("{}: {}", label, value));
        }
    }

    lines.push(format!(
        "PAC script: {}",
        if snapshot.is_using_default {
            "built-in (direct)"
        } else {
            "remote"
        }
    ));
    lines.push(format!(
        "Checked: {}",
        snapshot
            .checked_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    ));

    lines.join("\n")
}

/// One broadcast, as printed by `lessproxy watch`.
pub fn broadcast(broadcast: &Broadcast) -> String {
    match broadcast {
        Broadcast::ModeChange { mode } => format!("[{}] {}", broadcast.kind(), mode_line(*mode)),
        Broadcast::ProxyStatusUpdate { payload } => {
            format!("[{}]\n{}", broadcast.kind(), status(payload))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessproxy_core::IpInfo;

    #[test]
    fn test_settings_output() {
        let mut value = Settings::default();
        let text = settings(&value);
        assert!(text.contains("Proxy mode: smart"));
        assert!(text.contains("Auto reconnect: every 2 hours"));

        value.auto_reconnect = false;
        value.remote_config_url = String::new();
        let text = settings(&value);
        assert!(text.contains("Auto reconnect: off"));
        assert!(text.contains("(default)"));
    }

    #[test]
    fn test_status_output() {
        let info = IpInfo {
            ip: Some("198.51.100.7".to_string()),
            city: Some("Lisbon".to_string()),
            ..Default::default()
        };
        let text = status(&StatusSnapshot::from_info(info, false));

        assert!(text.contains("IP: 198.51.100.7"));
        assert!(text.contains("City: Lisbon"));
        assert!(text.contains("PAC script: remote"));
        assert!(!text.contains("ISP:"));
        assert!(!text.contains("Error:"));
    }

    #[test]
    fn test_failure_output() {
        let text = status(&StatusSnapshot::failure("Unable to check proxy status", true));
        assert!(text.starts_with("Error: Unable to check proxy status"));
        assert!(text.contains("built-in"));
    }

    #[test]
    fn test_broadcast_output() {
        let text = broadcast(&Broadcast::ModeChange {
            mode: ProxyMode::Direct,
        });
        assert!(text.starts_with("[MODE_CHANGE] Proxy mode: direct"));
    }
}

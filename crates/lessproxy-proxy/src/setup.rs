//! Cross-platform system proxy automation.
//!
//! Points the OS at a PAC URL ("automatic proxy configuration") or turns
//! proxying off. Every function shells out to the platform tool and reports
//! a [`SetupResult`] instead of failing hard, since a missing tool should
//! not take down the controller.

use std::process::Command;

use crate::error::ProxyError;

/// Result of a setup operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable message.
    pub message: String,
    /// Whether admin/root privileges are required.
    pub needs_admin: bool,
}

impl SetupResult {
    fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            needs_admin: false,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            needs_admin: false,
        }
    }

    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    fn needs_admin(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            needs_admin: true,
        }
    }

    /// Converts to a `Result`, keeping the message on success.
    pub fn into_result(self) -> Result<String, ProxyError> {
        if self.success {
            Ok(self.message)
        } else if self.needs_admin {
            Err(ProxyError::NeedsAdmin(self.message))
        } else {
            Err(ProxyError::Setup(self.message))
        }
    }
}

// ============================================================================
// System Proxy Configuration
// ============================================================================

/// Points the system proxy at a PAC script URL.
pub fn enable_auto_proxy(pac_url: &str) -> SetupResult {
    #[cfg(target_os = "windows")]
    {
        enable_auto_proxy_windows(pac_url)
    }

    #[cfg(target_os = "macos")]
    {
        enable_auto_proxy_macos(pac_url)
    }

    #[cfg(target_os = "linux")]
    {
        enable_auto_proxy_linux(pac_url)
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        let _ = pac_url;
        SetupResult::failure("Unsupported operating system")
    }
}

/// Turns the system proxy off (direct connections).
pub fn disable_system_proxy() -> SetupResult {
    #[cfg(target_os = "windows")]
    {
        disable_proxy_windows()
    }

    #[cfg(target_os = "macos")]
    {
        disable_proxy_macos()
    }

    #[cfg(target_os = "linux")]
    {
        disable_proxy_linux()
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        SetupResult::failure("Unsupported operating system")
    }
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn run(program: &str, args: &[&str]) -> std::io::Result<std::process::Output> {
    Command::new(program).args(args).output()
}

// ============================================================================
// Windows
// ============================================================================

const WINDOWS_REG_PATH: &str =
    r"HKCU:\Software\Microsoft\Windows\CurrentVersion\Internet Settings";

/// Quotes a value for a single-quoted PowerShell string.
fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn windows_enable_script(pac_url: &str) -> String {
    format!(
        r#"
        $regPath = '{}'
        Set-ItemProperty -Path $regPath -Name ProxyEnable -Value 0
        Set-ItemProperty -Path $regPath -Name AutoConfigURL -Value {}
        "#,
        WINDOWS_REG_PATH,
        powershell_quote(pac_url)
    )
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn windows_disable_script() -> String {
    format!(
        r#"
        $regPath = '{}'
        Set-ItemProperty -Path $regPath -Name ProxyEnable -Value 0
        Remove-ItemProperty -Path $regPath -Name AutoConfigURL -ErrorAction SilentlyContinue
        "#,
        WINDOWS_REG_PATH
    )
}

#[cfg(target_os = "windows")]
fn run_powershell(script: &str) -> std::io::Result<std::process::Output> {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x08000000;

    Command::new("powershell")
        .args(["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command", script])
        .creation_flags(CREATE_NO_WINDOW)
        .output()
}

#[cfg(target_os = "windows")]
fn enable_auto_proxy_windows(pac_url: &str) -> SetupResult {
    match run_powershell(&windows_enable_script(pac_url)) {
        Ok(out) if out.status.success() => {
            SetupResult::success(format!("Automatic proxy configuration set: {}", pac_url))
        }
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            SetupResult::failure(format!("Failed to set AutoConfigURL: {}", stderr))
        }
        Err(e) => SetupResult::failure(format!("Failed to run PowerShell: {}", e)),
    }
}

#[cfg(target_os = "windows")]
fn disable_proxy_windows() -> SetupResult {
    match run_powershell(&windows_disable_script()) {
        Ok(out) if out.status.success() => SetupResult::success("System proxy disabled"),
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            SetupResult::failure(format!("Failed to disable proxy: {}", stderr))
        }
        Err(e) => SetupResult::failure(format!("Failed to run PowerShell: {}", e)),
    }
}

// ============================================================================
// macOS
// ============================================================================

#[cfg(target_os = "macos")]
fn get_active_network_service() -> Option<String> {
    let output = run("networksetup", &["-listallnetworkservices"]).ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    for service in ["Wi-Fi", "Ethernet", "USB 10/100/1000 LAN"] {
        if stdout.lines().any(|line| line == service) {
            return Some(service.to_string());
        }
    }

    // First enabled service; disabled ones are prefixed with '*'
    stdout
        .lines()
        .skip(1)
        .find(|line| !line.starts_with('*'))
        .map(|s| s.to_string())
}

#[cfg(target_os = "macos")]
fn enable_auto_proxy_macos(pac_url: &str) -> SetupResult {
    let service = match get_active_network_service() {
        Some(s) => s,
        None => return SetupResult::failure("Could not find active network service"),
    };

    let url_result = run("networksetup", &["-setautoproxyurl", &service, pac_url]);
    let state_result = run("networksetup", &["-setautoproxystate", &service, "on"]);

    match (url_result, state_result) {
        (Ok(u), Ok(s)) if u.status.success() && s.status.success() => SetupResult::success(
            format!("Automatic proxy configuration set on {}: {}", service, pac_url),
        ),
        _ => SetupResult::needs_admin(
            "Failed to set automatic proxy. May need administrator privileges.",
        ),
    }
}

#[cfg(target_os = "macos")]
fn disable_proxy_macos() -> SetupResult {
    let service = match get_active_network_service() {
        Some(s) => s,
        None => return SetupResult::failure("Could not find active network service"),
    };

    match run("networksetup", &["-setautoproxystate", &service, "off"]) {
        Ok(out) if out.status.success() => SetupResult::success("System proxy disabled"),
        _ => SetupResult::needs_admin("Failed to disable proxy. May need administrator privileges."),
    }
}

// ============================================================================
// Linux
// ============================================================================

#[cfg(target_os = "linux")]
fn enable_auto_proxy_linux(pac_url: &str) -> SetupResult {
    let url_result = run(
        "gsettings",
        &["set", "org.gnome.system.proxy", "autoconfig-url", pac_url],
    );
    let mode_result = run("gsettings", &["set", "org.gnome.system.proxy", "mode", "auto"]);

    match (url_result, mode_result) {
        (Ok(u), Ok(m)) if u.status.success() && m.status.success() => {
            SetupResult::success(format!("GNOME automatic proxy configured: {}", pac_url))
        }
        (Err(e), _) | (_, Err(e)) => SetupResult::failure(format!(
            "gsettings unavailable ({}). Point your browser's automatic proxy URL at {}",
            e, pac_url
        )),
        _ => SetupResult::failure("gsettings rejected the proxy configuration"),
    }
}

#[cfg(target_os = "linux")]
fn disable_proxy_linux() -> SetupResult {
    match run("gsettings", &["set", "org.gnome.system.proxy", "mode", "none"]) {
        Ok(out) if out.status.success() => SetupResult::success("GNOME proxy disabled"),
        Ok(_) => SetupResult::failure("gsettings rejected the proxy configuration"),
        Err(e) => SetupResult::failure(format!("gsettings unavailable: {}", e)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_result_success() {
        let result = SetupResult::success("Test success");
        assert!(result.success);
        assert!(!result.needs_admin);
        assert_eq!(result.into_result().unwrap(), "Test success");
    }

    #[test]
    fn test_setup_result_failure() {
        let result = SetupResult::failure("Test failure");
        assert!(!result.success);
        assert!(matches!(result.into_result(), Err(ProxyError::Setup(_))));
    }

    #[test]
    fn test_setup_result_needs_admin() {
        let result = SetupResult::needs_admin("Need admin");
        assert!(!result.success);
        assert!(result.needs_admin);
        assert!(matches!(result.into_result(), Err(ProxyError::NeedsAdmin(_))));
    }

    #[test]
    fn test_powershell_quote_escapes_single_quotes() {
        assert_eq!(powershell_quote("http://a/b"), "'http://a/b'");
        assert_eq!(powershell_quote("http://a/it's"), "'http://a/it''s'");
    }

    #[test]
    fn test_windows_scripts() {
        let script = windows_enable_script("http://127.0.0.1:8765/proxy.pac?rev=3");
        assert!(script.contains("AutoConfigURL -Value 'http://127.0.0.1:8765/proxy.pac?rev=3'"));
        assert!(script.contains(WINDOWS_REG_PATH));

        let script = windows_disable_script();
        assert!(script.contains("Remove-ItemProperty"));
        assert!(script.contains("ProxyEnable -Value 0"));
    }
}

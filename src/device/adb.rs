use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::action::SystemButton;
use crate::config::DeviceConfig;
use crate::device::screenshot::Screenshot;
use crate::device::transport::{DeviceTransport, TextInputOutcome};
use crate::device::types::{DeviceInfo, PixelPoint, ScreenSize};
use crate::errors::{PilotError, PilotResult};
use crate::executor::text_input;

const SCREENCAP_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Device transport over the `adb` command-line client.
pub struct AdbTransport {
    adb_path: String,
    serial: String,
    timeout: Duration,
    ime_package: String,
    size: ScreenSize,
    cached: Option<Screenshot>,
}

impl AdbTransport {
    /// Picks the target device, checks it is online and reads its screen size.
    ///
    /// Without an explicit serial exactly one device must be attached.
    pub async fn connect(cfg: &DeviceConfig) -> PilotResult<Self> {
        let timeout = Duration::from_secs(cfg.command_timeout_secs);
        let devices = list_devices(&cfg.adb_path, timeout).await?;

        if devices.is_empty() {
            return Err(PilotError::DeviceNotFound(
                "no Android devices attached; enable USB debugging or run `adb connect <ip>:<port>`"
                    .into(),
            ));
        }

        let chosen = match &cfg.serial {
            Some(serial) => devices
                .iter()
                .find(|d| &d.serial == serial)
                .cloned()
                .ok_or_else(|| {
                    PilotError::DeviceNotFound(format!(
                        "device {serial} not attached; available: {}",
                        serial_list(&devices)
                    ))
                })?,
            None if devices.len() == 1 => devices[0].clone(),
            None => {
                return Err(PilotError::DeviceNotFound(format!(
                    "multiple devices attached ({}); pass --device-id",
                    serial_list(&devices)
                )))
            }
        };

        if !chosen.is_online() {
            return Err(PilotError::TransportDisconnected(format!(
                "device {} is {}",
                chosen.serial, chosen.state
            )));
        }

        let mut transport = Self {
            adb_path: cfg.adb_path.clone(),
            serial: chosen.serial.clone(),
            timeout,
            ime_package: cfg.adb_keyboard_package.clone(),
            size: ScreenSize::new(0, 0),
            cached: None,
        };

        let wm = transport.shell_text(&["wm", "size"]).await?;
        transport.size = parse_wm_size(&wm).ok_or_else(|| {
            PilotError::TransportActionFailed(format!("cannot parse `wm size` output: {wm:?}"))
        })?;

        tracing::info!(
            serial = %transport.serial,
            model = %chosen.model,
            android = %chosen.android_version,
            screen = %transport.size,
            "device connected"
        );
        Ok(transport)
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    async fn adb(&self, args: &[&str]) -> PilotResult<Vec<u8>> {
        let mut full = vec!["-s", self.serial.as_str()];
        full.extend_from_slice(args);
        let output = run_adb(&self.adb_path, &full, self.timeout).await?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let detail = format!("adb {} failed: {}", args.join(" "), stderr);
        if looks_disconnected(&stderr) || !self.is_online().await {
            Err(PilotError::TransportDisconnected(detail))
        } else {
            Err(PilotError::TransportActionFailed(detail))
        }
    }

    async fn shell(&self, args: &[&str]) -> PilotResult<Vec<u8>> {
        let mut full = vec!["shell"];
        full.extend_from_slice(args);
        self.adb(&full).await
    }

    async fn shell_text(&self, args: &[&str]) -> PilotResult<String> {
        let out = self.shell(args).await?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    async fn is_online(&self) -> bool {
        let args = ["-s", self.serial.as_str(), "get-state"];
        match run_adb(&self.adb_path, &args, self.timeout).await {
            Ok(out) => out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "device",
            Err(_) => false,
        }
    }

    async fn screencap(&self) -> PilotResult<Screenshot> {
        let png = self.adb(&["exec-out", "screencap", "-p"]).await?;
        Screenshot::from_png(png).map_err(|e| {
            PilotError::TransportActionFailed(format!("screencap returned an unreadable image: {e}"))
        })
    }

    async fn keyevent(&mut self, code: u32) -> PilotResult<()> {
        let code = code.to_string();
        self.cached = None;
        self.shell(&["input", "keyevent", &code]).await.map(|_| ())
    }

    async fn type_ascii(&self, text: &str) -> PilotResult<()> {
        let escaped = text_input::escape_for_input_text(text);
        self.shell(&["input", "text", &escaped]).await.map(|_| ())
    }

    async fn type_with_ime(&self, text: &str) -> PilotResult<()> {
        let component = text_input::ime_component(&self.ime_package);
        self.shell(&["ime", "enable", &component]).await?;
        self.shell(&["ime", "set", &component]).await?;
        let payload = text_input::ime_payload(text);
        self.shell(&[
            "am",
            "broadcast",
            "-a",
            text_input::ADB_KEYBOARD_B64_ACTION,
            "--es",
            "msg",
            &payload,
        ])
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl DeviceTransport for AdbTransport {
    fn screen_size(&self) -> ScreenSize {
        self.size
    }

    async fn capture_screenshot(&mut self) -> PilotResult<Screenshot> {
        if let Some(shot) = &self.cached {
            tracing::debug!("reusing cached screenshot");
            return Ok(shot.clone());
        }

        let shot = match self.screencap().await {
            Ok(shot) => shot,
            Err(PilotError::TransportDisconnected(e)) => {
                return Err(PilotError::TransportDisconnected(e))
            }
            Err(e) => {
                tracing::warn!(error = %e, "screencap failed, retrying once");
                tokio::time::sleep(SCREENCAP_RETRY_DELAY).await;
                self.screencap().await?
            }
        };
        self.cached = Some(shot.clone());
        Ok(shot)
    }

    fn invalidate_screenshot(&mut self) {
        self.cached = None;
    }

    async fn tap(&mut self, at: PixelPoint) -> PilotResult<()> {
        self.cached = None;
        let (x, y) = (at.x.to_string(), at.y.to_string());
        self.shell(&["input", "tap", &x, &y]).await.map(|_| ())
    }

    async fn swipe(&mut self, from: PixelPoint, to: PixelPoint, duration_ms: u64) -> PilotResult<()> {
        self.cached = None;
        let args = [
            from.x.to_string(),
            from.y.to_string(),
            to.x.to_string(),
            to.y.to_string(),
            duration_ms.to_string(),
        ];
        let mut cmd = vec!["input", "swipe"];
        cmd.extend(args.iter().map(String::as_str));
        self.shell(&cmd).await.map(|_| ())
    }

    async fn long_press(&mut self, at: PixelPoint, duration_ms: u64) -> PilotResult<()> {
        // A swipe that does not move is a long press.
        self.swipe(at, at, duration_ms).await
    }

    async fn type_text(&mut self, text: &str) -> PilotResult<TextInputOutcome> {
        if text.is_empty() {
            return Ok(TextInputOutcome::typed());
        }
        self.cached = None;

        let result = if text_input::needs_ime(text) {
            let ime_package = self.ime_package.clone();
            if !self.is_app_installed(&ime_package).await? {
                return Ok(TextInputOutcome::soft_failure(format!(
                    "cannot type non-ASCII text: {ime_package} (ADB Keyboard) is not installed"
                )));
            }
            self.type_with_ime(text).await
        } else {
            self.type_ascii(text).await
        };

        match result {
            Ok(()) => Ok(TextInputOutcome::typed()),
            Err(PilotError::TransportDisconnected(e)) => Err(PilotError::TransportDisconnected(e)),
            Err(e) => Ok(TextInputOutcome::soft_failure(e.to_string())),
        }
    }

    async fn press_button(&mut self, button: SystemButton) -> PilotResult<()> {
        self.keyevent(keycode(button)).await
    }

    async fn launch_app(&mut self, package: &str) -> PilotResult<()> {
        self.cached = None;
        let out = self
            .shell_text(&[
                "monkey",
                "-p",
                package,
                "-c",
                "android.intent.category.LAUNCHER",
                "1",
            ])
            .await?;
        if out.contains("No activities found") || out.contains("monkey aborted") {
            return Err(PilotError::TransportActionFailed(format!(
                "cannot launch {package}: no launcher activity"
            )));
        }
        Ok(())
    }

    async fn is_app_installed(&mut self, package: &str) -> PilotResult<bool> {
        Ok(self.installed_packages().await?.iter().any(|p| p == package))
    }

    async fn installed_packages(&mut self) -> PilotResult<Vec<String>> {
        let out = self.shell_text(&["pm", "list", "packages"]).await?;
        Ok(parse_package_list(&out))
    }
}

/// Lists attached devices with their model and Android version.
pub async fn list_devices(adb_path: &str, timeout: Duration) -> PilotResult<Vec<DeviceInfo>> {
    let out = run_adb(adb_path, &["devices"], timeout).await?;
    if !out.status.success() {
        return Err(PilotError::TransportDisconnected(format!(
            "adb devices failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let mut devices = Vec::new();
    for (serial, state) in parse_device_list(&String::from_utf8_lossy(&out.stdout)) {
        let mut info = DeviceInfo {
            serial,
            state,
            model: "unknown".into(),
            android_version: "unknown".into(),
        };
        if info.is_online() {
            info.model = getprop(adb_path, &info.serial, "ro.product.model", timeout).await;
            info.android_version =
                getprop(adb_path, &info.serial, "ro.build.version.release", timeout).await;
        }
        devices.push(info);
    }
    Ok(devices)
}

async fn getprop(adb_path: &str, serial: &str, prop: &str, timeout: Duration) -> String {
    match run_adb(adb_path, &["-s", serial, "shell", "getprop", prop], timeout).await {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        _ => "unknown".into(),
    }
}

async fn run_adb(adb_path: &str, args: &[&str], timeout: Duration) -> PilotResult<std::process::Output> {
    tracing::trace!(args = ?args, "adb");
    let child = Command::new(adb_path)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(
            PilotError::TransportDisconnected(format!("adb executable '{adb_path}' not found")),
        ),
        Ok(Err(e)) => Err(PilotError::TransportDisconnected(format!(
            "failed to run adb: {e}"
        ))),
        Err(_) => Err(PilotError::TransportDisconnected(format!(
            "adb {} timed out after {timeout:?}",
            args.join(" ")
        ))),
    }
}

/// Matches adb's own complaints about the device, not failures reported by
/// the command running on it.
fn looks_disconnected(stderr: &str) -> bool {
    let s = stderr.to_ascii_lowercase();
    let lost_serial = s.contains("error: device '") && s.contains("' not found");
    lost_serial
        || ["device offline", "no devices/emulators found", "device unauthorized"]
            .iter()
            .any(|needle| s.contains(needle))
}

fn keycode(button: SystemButton) -> u32 {
    match button {
        SystemButton::Back => 4,
        SystemButton::Home => 3,
        SystemButton::Menu | SystemButton::Recent => 187,
        SystemButton::Enter => 66,
    }
}

fn serial_list(devices: &[DeviceInfo]) -> String {
    devices
        .iter()
        .map(|d| d.serial.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parses `adb devices` output into `(serial, state)` pairs.
fn parse_device_list(out: &str) -> Vec<(String, String)> {
    out.lines()
        .skip_while(|l| !l.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some((serial.to_string(), state.to_string()))
        })
        .collect()
}

/// Parses `wm size`. An override size, when present, is what apps see.
fn parse_wm_size(out: &str) -> Option<ScreenSize> {
    let mut physical = None;
    let mut overridden = None;
    for line in out.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let Some((w, h)) = value.trim().split_once('x') else {
            continue;
        };
        let (Ok(w), Ok(h)) = (w.trim().parse::<u32>(), h.trim().parse::<u32>()) else {
            continue;
        };
        if label.contains("Override") {
            overridden = Some(ScreenSize::new(w, h));
        } else {
            physical = Some(ScreenSize::new(w, h));
        }
    }
    overridden.or(physical)
}

fn parse_package_list(out: &str) -> Vec<String> {
    out.lines()
        .filter_map(|l| l.trim().strip_prefix("package:"))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wm_size_prefers_override() {
        assert_eq!(
            parse_wm_size("Physical size: 1080x2400"),
            Some(ScreenSize::new(1080, 2400))
        );
        assert_eq!(
            parse_wm_size("Physical size: 1080x2400\nOverride size: 720x1600"),
            Some(ScreenSize::new(720, 1600))
        );
        assert_eq!(parse_wm_size("error: closed"), None);
    }

    #[test]
    fn test_parse_device_list() {
        let out = "* daemon started successfully\nList of devices attached\nemulator-5554\tdevice\n192.168.1.20:5555\toffline\n\n";
        assert_eq!(
            parse_device_list(out),
            vec![
                ("emulator-5554".to_string(), "device".to_string()),
                ("192.168.1.20:5555".to_string(), "offline".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_package_list() {
        let out = "package:com.android.settings\npackage:com.tencent.mm\n\ngarbage\n";
        assert_eq!(
            parse_package_list(out),
            vec!["com.android.settings".to_string(), "com.tencent.mm".to_string()]
        );
    }

    #[test]
    fn test_disconnect_markers() {
        assert!(looks_disconnected("error: device 'emulator-5554' not found"));
        assert!(looks_disconnected("error: device offline"));
        assert!(looks_disconnected("error: no devices/emulators found"));
        assert!(looks_disconnected("error: device unauthorized."));
        assert!(!looks_disconnected("Error: Unknown command: tapp"));
        assert!(!looks_disconnected("Error: Activity not found"));
        assert!(!looks_disconnected("/system/bin/sh: input: not found"));
        assert!(!looks_disconnected("java.io.IOException: Stream closed"));
    }

    #[test]
    fn test_keycodes() {
        assert_eq!(keycode(SystemButton::Back), 4);
        assert_eq!(keycode(SystemButton::Home), 3);
        assert_eq!(keycode(SystemButton::Recent), 187);
        assert_eq!(keycode(SystemButton::Enter), 66);
    }
}

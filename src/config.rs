use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{FailureKind, PilotError, PilotResult};

const CONFIG_FILE: &str = "config.toml";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub gestures: GestureConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// App name -> package overrides for `open`. Keys are matched case-insensitively.
    #[serde(default)]
    pub apps: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Bearer token. `DROIDPILOT_API_KEY` takes precedence.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Number of previous steps replayed to the model.
    #[serde(default = "default_history_n")]
    pub history_n: usize,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Longer side of the image sent to the model; 0 sends it unscaled.
    #[serde(default)]
    pub max_image_side: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            name: default_model_name(),
            api_key: None,
            temperature: 0.0,
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            history_n: default_history_n(),
            stream: false,
            request_timeout_secs: default_request_timeout(),
            max_image_side: 0,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000/v1".into()
}

fn default_model_name() -> String {
    "MAI-UI-8B".into()
}

fn default_top_p() -> f64 {
    1.0
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_history_n() -> usize {
    3
}

fn default_request_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Required only when more than one device is attached.
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default = "default_adb_path")]
    pub adb_path: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_adb_keyboard")]
    pub adb_keyboard_package: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: None,
            adb_path: default_adb_path(),
            command_timeout_secs: default_command_timeout(),
            adb_keyboard_package: default_adb_keyboard(),
        }
    }
}

fn default_adb_path() -> String {
    "adb".into()
}

fn default_command_timeout() -> u64 {
    30
}

fn default_adb_keyboard() -> String {
    "com.android.adbkeyboard".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GestureConfig {
    #[serde(default = "default_swipe_ms")]
    pub swipe_ms: u64,
    #[serde(default = "default_long_press_ms")]
    pub long_press_ms: u64,
    #[serde(default = "default_drag_ms")]
    pub drag_ms: u64,
    #[serde(default = "default_double_tap_interval")]
    pub double_tap_interval_ms: u64,
    #[serde(default = "default_pinch_offset")]
    pub pinch_offset_px: i32,
    #[serde(default = "default_rotate_offset")]
    pub rotate_offset_px: i32,
    /// Pause after launching an app so it can draw its first frame.
    #[serde(default = "default_launch_settle")]
    pub launch_settle_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            swipe_ms: default_swipe_ms(),
            long_press_ms: default_long_press_ms(),
            drag_ms: default_drag_ms(),
            double_tap_interval_ms: default_double_tap_interval(),
            pinch_offset_px: default_pinch_offset(),
            rotate_offset_px: default_rotate_offset(),
            launch_settle_ms: default_launch_settle(),
        }
    }
}

fn default_swipe_ms() -> u64 {
    300
}

fn default_long_press_ms() -> u64 {
    1000
}

fn default_drag_ms() -> u64 {
    1000
}

fn default_double_tap_interval() -> u64 {
    100
}

fn default_pinch_offset() -> i32 {
    100
}

fn default_rotate_offset() -> i32 {
    80
}

fn default_launch_settle() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Delay after each successful step before the next capture.
    #[serde(default = "default_step_delay")]
    pub step_delay_ms: u64,
    #[serde(default = "default_loop_breaker_pause")]
    pub loop_breaker_pause_ms: u64,
    #[serde(default = "default_ask_timeout")]
    pub ask_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            step_delay_ms: default_step_delay(),
            loop_breaker_pause_ms: default_loop_breaker_pause(),
            ask_timeout_secs: default_ask_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_max_steps() -> u32 {
    50
}

fn default_step_delay() -> u64 {
    500
}

fn default_loop_breaker_pause() -> u64 {
    2000
}

fn default_ask_timeout() -> u64 {
    120
}

/// Which step-fatal failures are retried instead of failing the task.
/// Empty `retry_on` never retries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub retry_on: Vec<FailureKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub save_trajectory: bool,
    #[serde(default = "default_true")]
    pub save_screenshots: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            save_trajectory: true,
            save_screenshots: true,
            output_dir: default_output_dir(),
        }
    }
}

fn default_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".droidpilot")
        .join("logs")
}

impl AppConfig {
    pub fn validate(&self) -> PilotResult<()> {
        if self.model.base_url.trim().is_empty() {
            return Err(PilotError::Config("model.base_url must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(PilotError::Config(format!(
                "model.temperature must be within [0, 2], got {}",
                self.model.temperature
            )));
        }
        if self.execution.max_steps < 1 {
            return Err(PilotError::Config("execution.max_steps must be at least 1".into()));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(PilotError::Config(format!(
                "logging.level '{}' is not one of {LOG_LEVELS:?}",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Applies `DROIDPILOT_*` variables from `lookup` (normally the process env).
    pub fn apply_env<F>(&mut self, lookup: F) -> PilotResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DROIDPILOT_MODEL_URL") {
            self.model.base_url = url;
        }
        if let Some(name) = lookup("DROIDPILOT_MODEL_NAME") {
            self.model.name = name;
        }
        if let Some(key) = lookup("DROIDPILOT_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(serial) = lookup("DROIDPILOT_DEVICE_SERIAL") {
            self.device.serial = Some(serial);
        }
        if let Some(steps) = lookup("DROIDPILOT_MAX_STEPS") {
            self.execution.max_steps = steps.trim().parse().map_err(|_| {
                PilotError::Config(format!("DROIDPILOT_MAX_STEPS is not a number: {steps:?}"))
            })?;
        }
        if let Some(level) = lookup("DROIDPILOT_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }
}

/// Finds `config.toml`: explicit path, next to the executable, the working
/// directory, then the user config dir. `None` means run on defaults.
pub fn resolve_config_path(explicit: Option<&Path>) -> PilotResult<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(PilotError::Config(format!(
            "config file {} does not exist",
            path.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(Some(candidate));
            }
        }
    }

    let candidate = std::env::current_dir()?.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(Some(candidate));
    }

    if let Some(candidate) = user_config_path() {
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

/// `<config_dir>/droidpilot/config.toml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("droidpilot").join(CONFIG_FILE))
}

pub fn load_config_from(path: &Path) -> PilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), model = %config.model.name, "config loaded");
    Ok(config)
}

/// Loads the config file (or defaults), then `.env` and the environment.
pub fn load_config(explicit: Option<&Path>) -> PilotResult<AppConfig> {
    let mut config = match resolve_config_path(explicit)? {
        Some(path) => load_config_from(&path)?,
        None => {
            tracing::debug!("no config.toml found, using defaults");
            AppConfig::default()
        }
    };

    let _ = dotenvy::dotenv();
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> PilotResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use droidpilot_lib::action::SystemButton;
use droidpilot_lib::agent_engine::UserPrompter;
use droidpilot_lib::config::AppConfig;
use droidpilot_lib::device::{DeviceTransport, PixelPoint, ScreenSize, Screenshot, TextInputOutcome};
use droidpilot_lib::errors::{PilotError, PilotResult};
use droidpilot_lib::llm::{ModelClient, PredictionRequest};

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::new(width, height);
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

/// Config with every delay zeroed and output under `dir`.
pub fn test_config(dir: &Path, max_steps: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.execution.max_steps = max_steps;
    config.execution.step_delay_ms = 0;
    config.execution.loop_breaker_pause_ms = 0;
    config.execution.ask_timeout_secs = 5;
    config.gestures.launch_settle_ms = 0;
    config.gestures.double_tap_interval_ms = 0;
    config.logging.output_dir = dir.to_path_buf();
    config
}

/// In-memory device. Every call is appended to `log`.
pub struct FakeTransport {
    size: ScreenSize,
    png: Vec<u8>,
    cached: Option<Screenshot>,
    captures: usize,
    /// Screenshots actually taken, cache hits excluded.
    pub fresh_captures: Arc<AtomicUsize>,
    /// 1-based capture call that reports a lost device.
    pub disconnect_on_capture: Option<usize>,
    pub packages: Vec<String>,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            size: ScreenSize::new(1080, 2400),
            png: png(54, 120),
            cached: None,
            captures: 0,
            fresh_captures: Arc::new(AtomicUsize::new(0)),
            disconnect_on_capture: None,
            packages: vec![
                "com.android.settings".to_string(),
                "com.tencent.mm".to_string(),
            ],
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn disconnecting_on(mut self, capture: usize) -> Self {
        self.disconnect_on_capture = Some(capture);
        self
    }

    fn push(&mut self, entry: String) {
        self.cached = None;
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl DeviceTransport for FakeTransport {
    fn screen_size(&self) -> ScreenSize {
        self.size
    }

    async fn capture_screenshot(&mut self) -> PilotResult<Screenshot> {
        self.captures += 1;
        if self.disconnect_on_capture == Some(self.captures) {
            return Err(PilotError::TransportDisconnected("device offline".into()));
        }
        if let Some(shot) = &self.cached {
            return Ok(shot.clone());
        }
        self.fresh_captures.fetch_add(1, Ordering::SeqCst);
        let shot = Screenshot::from_png(self.png.clone())?;
        self.cached = Some(shot.clone());
        Ok(shot)
    }

    fn invalidate_screenshot(&mut self) {
        self.cached = None;
    }

    async fn tap(&mut self, at: PixelPoint) -> PilotResult<()> {
        self.push(format!("tap {} {}", at.x, at.y));
        Ok(())
    }

    async fn swipe(&mut self, from: PixelPoint, to: PixelPoint, duration_ms: u64) -> PilotResult<()> {
        self.push(format!("swipe {} {} {} {} {duration_ms}", from.x, from.y, to.x, to.y));
        Ok(())
    }

    async fn long_press(&mut self, at: PixelPoint, duration_ms: u64) -> PilotResult<()> {
        self.push(format!("long_press {} {} {duration_ms}", at.x, at.y));
        Ok(())
    }

    async fn type_text(&mut self, text: &str) -> PilotResult<TextInputOutcome> {
        self.push(format!("type {text}"));
        if text.is_ascii() {
            Ok(TextInputOutcome::typed())
        } else {
            Ok(TextInputOutcome::soft_failure("ADB Keyboard is not installed"))
        }
    }

    async fn press_button(&mut self, button: SystemButton) -> PilotResult<()> {
        self.push(format!("button {}", button.as_str()));
        Ok(())
    }

    async fn launch_app(&mut self, package: &str) -> PilotResult<()> {
        self.push(format!("launch {package}"));
        Ok(())
    }

    async fn is_app_installed(&mut self, package: &str) -> PilotResult<bool> {
        Ok(self.packages.iter().any(|p| p == package))
    }

    async fn installed_packages(&mut self) -> PilotResult<Vec<String>> {
        Ok(self.packages.clone())
    }
}

/// What the model was asked, per call.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub step: u32,
    pub history_len: usize,
    pub user_reply: Option<String>,
}

/// Replies from a fixed script; the last reply repeats once the script runs out.
pub struct ScriptedModel {
    replies: Vec<String>,
    calls: AtomicUsize,
    delay: Duration,
    pub seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedModel {
    pub fn new<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn predict(&self, request: &PredictionRequest) -> PilotResult<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(SeenRequest {
            step: request.step,
            history_len: request.history.len(),
            user_reply: request.user_reply.clone(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let idx = n.min(self.replies.len().saturating_sub(1));
        Ok(self.replies.get(idx).cloned().unwrap_or_default())
    }
}

pub fn tool_call(action_json: &str) -> String {
    format!(
        "<thinking>working on it</thinking>\n<tool_call>\n{{\"name\": \"mobile_use\", \"arguments\": {action_json}}}\n</tool_call>"
    )
}

pub struct FixedAnswer(pub String);

#[async_trait]
impl UserPrompter for FixedAnswer {
    async fn ask(&self, _question: &str) -> PilotResult<String> {
        Ok(self.0.clone())
    }
}

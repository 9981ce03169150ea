use async_trait::async_trait;

use crate::action::SystemButton;
use crate::device::screenshot::Screenshot;
use crate::device::types::{PixelPoint, ScreenSize};
use crate::errors::PilotResult;

/// Result of a text entry attempt. Rejected input is reported here rather
/// than as an error so the caller can decide whether to carry on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextInputOutcome {
    pub ok: bool,
    pub diagnostic: Option<String>,
}

impl TextInputOutcome {
    pub fn typed() -> Self {
        Self {
            ok: true,
            diagnostic: None,
        }
    }

    pub fn soft_failure(diagnostic: impl Into<String>) -> Self {
        Self {
            ok: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// Control channel to one device.
///
/// Implementations must report connection loss as
/// [`PilotError::TransportDisconnected`](crate::errors::PilotError::TransportDisconnected)
/// and a refused command as
/// [`PilotError::TransportActionFailed`](crate::errors::PilotError::TransportActionFailed).
/// Every mutating call drops the cached screenshot.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Screen size read when the session was opened.
    fn screen_size(&self) -> ScreenSize;

    /// Returns the cached capture when nothing has invalidated it, otherwise
    /// a fresh one.
    async fn capture_screenshot(&mut self) -> PilotResult<Screenshot>;

    /// Forces the next capture to hit the device.
    fn invalidate_screenshot(&mut self);

    async fn tap(&mut self, at: PixelPoint) -> PilotResult<()>;

    async fn swipe(&mut self, from: PixelPoint, to: PixelPoint, duration_ms: u64)
        -> PilotResult<()>;

    async fn long_press(&mut self, at: PixelPoint, duration_ms: u64) -> PilotResult<()>;

    async fn type_text(&mut self, text: &str) -> PilotResult<TextInputOutcome>;

    async fn press_button(&mut self, button: SystemButton) -> PilotResult<()>;

    async fn launch_app(&mut self, package: &str) -> PilotResult<()>;

    async fn is_app_installed(&mut self, package: &str) -> PilotResult<bool>;

    async fn installed_packages(&mut self) -> PilotResult<Vec<String>>;
}

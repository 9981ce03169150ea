// Sends a planned device command to the transport.
use std::collections::HashMap;
use std::time::Duration;

use crate::config::GestureConfig;
use crate::device::DeviceTransport;
use crate::errors::{PilotError, PilotResult};
use crate::executor::app_resolver::{self, Resolution};
use crate::executor::input::DeviceCommand;

/// What happened on the device. A soft failure is a command the device
/// declined without the step being lost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatched {
    pub soft_failure: Option<String>,
}

pub struct Dispatcher<'a> {
    gestures: &'a GestureConfig,
    apps: &'a HashMap<String, String>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(gestures: &'a GestureConfig, apps: &'a HashMap<String, String>) -> Self {
        Self { gestures, apps }
    }

    pub async fn dispatch(
        &self,
        cmd: &DeviceCommand,
        transport: &mut dyn DeviceTransport,
    ) -> PilotResult<Dispatched> {
        match cmd {
            DeviceCommand::Tap(at) => {
                tracing::debug!(at = %at, "tap");
                transport.tap(*at).await?;
            }
            DeviceCommand::DoubleTap { at, interval_ms } => {
                tracing::debug!(at = %at, "double tap");
                transport.tap(*at).await?;
                tokio::time::sleep(Duration::from_millis(*interval_ms)).await;
                transport.tap(*at).await?;
            }
            DeviceCommand::LongPress { at, duration_ms } => {
                tracing::debug!(at = %at, duration_ms, "long press");
                transport.long_press(*at, *duration_ms).await?;
            }
            DeviceCommand::Swipe {
                stroke,
                duration_ms,
            } => {
                tracing::debug!(from = %stroke.from, to = %stroke.to, duration_ms, "swipe");
                transport.swipe(stroke.from, stroke.to, *duration_ms).await?;
            }
            DeviceCommand::Strokes {
                strokes,
                duration_ms,
            } => {
                for stroke in strokes {
                    tracing::debug!(from = %stroke.from, to = %stroke.to, "stroke");
                    transport.swipe(stroke.from, stroke.to, *duration_ms).await?;
                }
            }
            DeviceCommand::Type(text) => {
                tracing::debug!(chars = text.chars().count(), "type text");
                let outcome = transport.type_text(text).await?;
                if !outcome.ok {
                    let diagnostic = outcome
                        .diagnostic
                        .unwrap_or_else(|| "text input rejected".into());
                    tracing::warn!(diagnostic = %diagnostic, "text input soft failure");
                    return Ok(Dispatched {
                        soft_failure: Some(diagnostic),
                    });
                }
            }
            DeviceCommand::Button(button) => {
                tracing::debug!(button = button.as_str(), "system button");
                transport.press_button(*button).await?;
            }
            DeviceCommand::Launch(app) => {
                let package = self.resolve_package(app, transport).await?;
                transport.launch_app(&package).await?;
                tokio::time::sleep(Duration::from_millis(self.gestures.launch_settle_ms)).await;
                transport.invalidate_screenshot();
            }
            DeviceCommand::Wait(duration) => {
                tracing::debug!(secs = duration.as_secs(), "waiting");
                tokio::time::sleep(*duration).await;
                transport.invalidate_screenshot();
            }
            DeviceCommand::Control => {}
        }
        Ok(Dispatched::default())
    }

    async fn resolve_package(
        &self,
        app: &str,
        transport: &mut dyn DeviceTransport,
    ) -> PilotResult<String> {
        let installed = match transport.installed_packages().await {
            Ok(list) => list,
            Err(e @ PilotError::TransportDisconnected(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "cannot list installed packages, resolving without them");
                Vec::new()
            }
        };
        let (package, how) = app_resolver::resolve(app, self.apps, &installed);
        if how == Resolution::Fallback {
            tracing::warn!(app = %app, package = %package, "no installed package matches, trying a guess");
        } else {
            tracing::info!(app = %app, package = %package, resolution = ?how, "app resolved");
        }
        Ok(package)
    }
}

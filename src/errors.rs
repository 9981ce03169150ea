use std::time::Duration;

use thiserror::Error;

use crate::action::validator::ValidationError;
use crate::llm::prediction::PredictionParseError;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The device stopped answering: adb lost it, or a command timed out.
    #[error("Device disconnected: {0}")]
    TransportDisconnected(String),

    /// The device is reachable but refused or failed a specific command.
    #[error("Device action failed: {0}")]
    TransportActionFailed(String),

    #[error("Model did not answer within {0:?}")]
    PredictionTimeout(Duration),

    #[error("Model endpoint unreachable: {0}")]
    PredictionUnreachable(String),

    #[error("Prediction parse error: {0}")]
    Parse(#[from] PredictionParseError),

    #[error("Invalid action: {0}")]
    Validation(#[from] ValidationError),

    #[error("User prompt failed: {0}")]
    UserPrompt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Coarse classification used by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TransportDisconnected,
    TransportActionFailed,
    PredictionTimeout,
    PredictionUnreachable,
    Parse,
    Validation,
    Other,
}

impl PilotError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PilotError::TransportDisconnected(_) | PilotError::DeviceNotFound(_) => {
                FailureKind::TransportDisconnected
            }
            PilotError::TransportActionFailed(_) => FailureKind::TransportActionFailed,
            PilotError::PredictionTimeout(_) => FailureKind::PredictionTimeout,
            PilotError::PredictionUnreachable(_) | PilotError::Http(_) => {
                FailureKind::PredictionUnreachable
            }
            PilotError::Parse(_) => FailureKind::Parse,
            PilotError::Validation(_) => FailureKind::Validation,
            _ => FailureKind::Other,
        }
    }
}

impl serde::Serialize for PilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type PilotResult<T> = Result<T, PilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_separates_disconnect_from_rejection() {
        let lost = PilotError::TransportDisconnected("device offline".into());
        let rejected = PilotError::TransportActionFailed("input tap: exit 1".into());
        assert_eq!(lost.kind(), FailureKind::TransportDisconnected);
        assert_eq!(rejected.kind(), FailureKind::TransportActionFailed);
    }

    #[test]
    fn test_parse_and_validation_kinds() {
        let parse: PilotError = PredictionParseError::NoActionFound.into();
        assert_eq!(parse.kind(), FailureKind::Parse);

        let invalid: PilotError = ValidationError::new("coordinate", "must be [x, y]").into();
        assert_eq!(invalid.kind(), FailureKind::Validation);
        assert!(invalid.to_string().contains("coordinate"));
    }

    #[test]
    fn test_serializes_as_display_string() {
        let err = PilotError::PredictionTimeout(Duration::from_secs(5));
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Model did not answer within 5s\"");
    }
}

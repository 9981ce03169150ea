//! Turns an arbitrary JSON value into a well-formed [`Action`].
//!
//! Rules run in order: the value must be an object, it must carry a known
//! `action` discriminator, and every field that kind requires must be present
//! and well-typed. The first violation is reported with the offending field.
use serde_json::{Map, Value};
use thiserror::Error;

use crate::action::types::{
    Action, ActionKind, NormPoint, PinchDirection, RotateDirection, SwipeDirection, SwipePath,
    SystemButton, TerminateStatus,
};

pub const WAIT_DEFAULT_SECS: u64 = 2;
pub const WAIT_MIN_SECS: u64 = 1;
pub const WAIT_MAX_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

type Fields = Map<String, Value>;

pub fn validate_action(value: &Value) -> Result<Action, ValidationError> {
    let Some(obj) = value.as_object() else {
        return Err(ValidationError::new(
            "action",
            format!("expected a JSON object, got {}", type_name(value)),
        ));
    };

    let raw_kind = match obj.get("action") {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            return Err(ValidationError::new(
                "action",
                format!("expected a string, got {}", type_name(other)),
            ))
        }
        None => return Err(ValidationError::new("action", "missing action kind")),
    };

    let Some(kind) = ActionKind::parse(raw_kind) else {
        let known: Vec<&str> = ActionKind::ALL.iter().map(|k| k.as_str()).collect();
        return Err(ValidationError::new(
            "action",
            format!("unknown action kind '{raw_kind}', expected one of {known:?}"),
        ));
    };

    let action = match kind {
        ActionKind::Tap => Action::Tap {
            at: point(obj, "coordinate")?,
        },
        ActionKind::LongPress => Action::LongPress {
            at: point(obj, "coordinate")?,
        },
        ActionKind::DoubleClick => Action::DoubleClick {
            at: point(obj, "coordinate")?,
        },
        ActionKind::Swipe => Action::Swipe(swipe_path(obj)?),
        ActionKind::Drag => Action::Drag {
            start: point(obj, "start_coordinate")?,
            end: point(obj, "end_coordinate")?,
        },
        ActionKind::Pinch => Action::Pinch {
            at: point(obj, "coordinate")?,
            direction: optional_enum(obj, "direction", PinchDirection::parse, &["in", "out"])?
                .unwrap_or(PinchDirection::Out),
        },
        ActionKind::Rotate => Action::Rotate {
            at: point(obj, "coordinate")?,
            direction: optional_enum(
                obj,
                "direction",
                RotateDirection::parse,
                &["clockwise", "counterclockwise"],
            )?
            .unwrap_or(RotateDirection::Clockwise),
        },
        ActionKind::Type => Action::Type {
            text: string(obj, "text")?,
        },
        ActionKind::SystemButton => Action::SystemButton(
            optional_enum(obj, "button", SystemButton::parse, &SystemButton::ALL)?
                .ok_or_else(|| ValidationError::new("button", "missing system button name"))?,
        ),
        ActionKind::Open => Action::Open {
            app: non_empty_string(obj, "text")?,
        },
        ActionKind::Wait => Action::Wait {
            seconds: wait_seconds(obj)?,
        },
        ActionKind::Note => Action::Note {
            text: string(obj, "text")?,
        },
        ActionKind::Terminate => Action::Terminate(
            optional_enum(obj, "status", TerminateStatus::parse, &["success", "fail"])?
                .unwrap_or(TerminateStatus::Success),
        ),
        ActionKind::Answer => Action::Answer {
            text: string(obj, "text")?,
        },
        ActionKind::AskUser => Action::AskUser {
            question: non_empty_string(obj, "question")?,
        },
        ActionKind::McpCall => {
            let tool = non_empty_string(obj, "tool")?;
            let args = match obj.get("args") {
                Some(Value::Object(map)) => map.clone(),
                Some(other) => {
                    return Err(ValidationError::new(
                        "args",
                        format!("expected an object, got {}", type_name(other)),
                    ))
                }
                None => return Err(ValidationError::new("args", "mcp_call requires 'args'")),
            };
            Action::McpCall { tool, args }
        }
    };
    Ok(action)
}

fn swipe_path(obj: &Fields) -> Result<SwipePath, ValidationError> {
    let has_direction = obj.contains_key("direction");
    let has_points = obj.contains_key("start") || obj.contains_key("end");

    if has_direction && has_points {
        return Err(ValidationError::new(
            "direction",
            "swipe takes either 'direction' or 'start'/'end', not both",
        ));
    }

    if has_direction {
        let direction =
            optional_enum(obj, "direction", SwipeDirection::parse, &SwipeDirection::ALL)?
                .ok_or_else(|| ValidationError::new("direction", "missing swipe direction"))?;
        let anchor = match obj.get("coordinate") {
            None | Some(Value::Null) => None,
            Some(_) => Some(point(obj, "coordinate")?),
        };
        return Ok(SwipePath::Direction { direction, anchor });
    }

    if has_points {
        return Ok(SwipePath::Between {
            start: point(obj, "start")?,
            end: point(obj, "end")?,
        });
    }

    Err(ValidationError::new(
        "direction",
        "swipe requires 'direction' or both 'start' and 'end'",
    ))
}

fn point(obj: &Fields, field: &str) -> Result<NormPoint, ValidationError> {
    let value = obj
        .get(field)
        .ok_or_else(|| ValidationError::new(field, "missing coordinate"))?;
    let Some(items) = value.as_array() else {
        return Err(ValidationError::new(
            field,
            format!("expected [x, y], got {}", type_name(value)),
        ));
    };
    if items.len() != 2 {
        return Err(ValidationError::new(
            field,
            format!("expected 2 components, got {}", items.len()),
        ));
    }
    match (items[0].as_f64(), items[1].as_f64()) {
        (Some(x), Some(y)) => Ok(NormPoint::new(x, y)),
        _ => Err(ValidationError::new(field, "coordinate components must be numbers")),
    }
}

fn string(obj: &Fields, field: &str) -> Result<String, ValidationError> {
    match obj.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ValidationError::new(
            field,
            format!("expected a string, got {}", type_name(other)),
        )),
        None => Err(ValidationError::new(field, "missing required field")),
    }
}

fn non_empty_string(obj: &Fields, field: &str) -> Result<String, ValidationError> {
    let s = string(obj, field)?;
    if s.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(s)
}

/// Reads an optional string enum; absent or `null` yields `None`.
fn optional_enum<T>(
    obj: &Fields,
    field: &str,
    parse: fn(&str) -> Option<T>,
    allowed: &[&str],
) -> Result<Option<T>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse(s).map(Some).ok_or_else(|| {
            ValidationError::new(field, format!("'{s}' is not one of {allowed:?}"))
        }),
        Some(other) => Err(ValidationError::new(
            field,
            format!("expected a string, got {}", type_name(other)),
        )),
    }
}

fn wait_seconds(obj: &Fields) -> Result<u64, ValidationError> {
    let raw = match obj.get("duration") {
        None | Some(Value::Null) => return Ok(WAIT_DEFAULT_SECS),
        Some(v) => v.as_f64().ok_or_else(|| {
            ValidationError::new("duration", format!("expected seconds, got {}", type_name(v)))
        })?,
    };
    let clamped = raw.clamp(WAIT_MIN_SECS as f64, WAIT_MAX_SECS as f64);
    Ok(clamped as u64)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::action::validator::validate_action;

/// A point in model space. Both components are expected in `[0, 1]`; the
/// range is enforced when the point is mapped onto the screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormPoint {
    pub x: f64,
    pub y: f64,
}

impl NormPoint {
    pub const CENTER: NormPoint = NormPoint { x: 0.5, y: 0.5 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn to_value(self) -> Value {
        json!([self.x, self.y])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    pub const ALL: [&'static str; 4] = ["up", "down", "left", "right"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinchDirection {
    /// Fingers move together (zoom out).
    In,
    /// Fingers move apart (zoom in).
    Out,
}

impl PinchDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "in" => Some(Self::In),
            "out" => Some(Self::Out),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateDirection {
    Clockwise,
    Counterclockwise,
}

impl RotateDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "clockwise" => Some(Self::Clockwise),
            "counterclockwise" | "anticlockwise" => Some(Self::Counterclockwise),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clockwise => "clockwise",
            Self::Counterclockwise => "counterclockwise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemButton {
    Back,
    Home,
    Menu,
    Recent,
    Enter,
}

impl SystemButton {
    pub const ALL: [&'static str; 5] = ["back", "home", "menu", "recent", "enter"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "back" => Some(Self::Back),
            "home" => Some(Self::Home),
            "menu" => Some(Self::Menu),
            "recent" => Some(Self::Recent),
            "enter" => Some(Self::Enter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Back => "back",
            Self::Home => "home",
            Self::Menu => "menu",
            Self::Recent => "recent",
            Self::Enter => "enter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateStatus {
    Success,
    Fail,
}

impl TerminateStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Fail => "fail",
        }
    }
}

/// The two mutually exclusive ways a swipe can be described.
#[derive(Debug, Clone, PartialEq)]
pub enum SwipePath {
    /// Swipe in a direction around `anchor` (screen centre when absent).
    Direction {
        direction: SwipeDirection,
        anchor: Option<NormPoint>,
    },
    Between { start: NormPoint, end: NormPoint },
}

/// One device-directed instruction chosen by the model.
///
/// Serialized with the same wire shape the model emits
/// (`{"action": "tap", "coordinate": [x, y]}`); deserialization runs the
/// validator, so a value read back from a trajectory is always well-formed.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Tap { at: NormPoint },
    LongPress { at: NormPoint },
    DoubleClick { at: NormPoint },
    Swipe(SwipePath),
    Drag { start: NormPoint, end: NormPoint },
    Pinch { at: NormPoint, direction: PinchDirection },
    Rotate { at: NormPoint, direction: RotateDirection },
    Type { text: String },
    SystemButton(SystemButton),
    Open { app: String },
    Wait { seconds: u64 },
    Note { text: String },
    Terminate(TerminateStatus),
    Answer { text: String },
    AskUser { question: String },
    McpCall { tool: String, args: Map<String, Value> },
}

/// The closed set of action kinds, as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Tap,
    LongPress,
    DoubleClick,
    Swipe,
    Drag,
    Pinch,
    Rotate,
    Type,
    SystemButton,
    Open,
    Wait,
    Note,
    Terminate,
    Answer,
    AskUser,
    McpCall,
}

impl ActionKind {
    pub const ALL: [ActionKind; 16] = [
        ActionKind::Tap,
        ActionKind::LongPress,
        ActionKind::DoubleClick,
        ActionKind::Swipe,
        ActionKind::Drag,
        ActionKind::Pinch,
        ActionKind::Rotate,
        ActionKind::Type,
        ActionKind::SystemButton,
        ActionKind::Open,
        ActionKind::Wait,
        ActionKind::Note,
        ActionKind::Terminate,
        ActionKind::Answer,
        ActionKind::AskUser,
        ActionKind::McpCall,
    ];

    /// `click` is what the model's prompt calls a tap.
    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "tap" | "click" => Self::Tap,
            "long_press" => Self::LongPress,
            "double_click" => Self::DoubleClick,
            "swipe" => Self::Swipe,
            "drag" => Self::Drag,
            "pinch" => Self::Pinch,
            "rotate" => Self::Rotate,
            "type" => Self::Type,
            "system_button" => Self::SystemButton,
            "open" => Self::Open,
            "wait" => Self::Wait,
            "note" => Self::Note,
            "terminate" => Self::Terminate,
            "answer" => Self::Answer,
            "ask_user" => Self::AskUser,
            "mcp_call" => Self::McpCall,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tap => "tap",
            Self::LongPress => "long_press",
            Self::DoubleClick => "double_click",
            Self::Swipe => "swipe",
            Self::Drag => "drag",
            Self::Pinch => "pinch",
            Self::Rotate => "rotate",
            Self::Type => "type",
            Self::SystemButton => "system_button",
            Self::Open => "open",
            Self::Wait => "wait",
            Self::Note => "note",
            Self::Terminate => "terminate",
            Self::Answer => "answer",
            Self::AskUser => "ask_user",
            Self::McpCall => "mcp_call",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Tap { .. } => ActionKind::Tap,
            Action::LongPress { .. } => ActionKind::LongPress,
            Action::DoubleClick { .. } => ActionKind::DoubleClick,
            Action::Swipe(_) => ActionKind::Swipe,
            Action::Drag { .. } => ActionKind::Drag,
            Action::Pinch { .. } => ActionKind::Pinch,
            Action::Rotate { .. } => ActionKind::Rotate,
            Action::Type { .. } => ActionKind::Type,
            Action::SystemButton(_) => ActionKind::SystemButton,
            Action::Open { .. } => ActionKind::Open,
            Action::Wait { .. } => ActionKind::Wait,
            Action::Note { .. } => ActionKind::Note,
            Action::Terminate(_) => ActionKind::Terminate,
            Action::Answer { .. } => ActionKind::Answer,
            Action::AskUser { .. } => ActionKind::AskUser,
            Action::McpCall { .. } => ActionKind::McpCall,
        }
    }

    /// `terminate` and `answer` end the task.
    pub fn ends_task(&self) -> bool {
        matches!(self, Action::Terminate(_) | Action::Answer { .. })
    }

    /// Wire representation, as the model would have written it.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("action".into(), Value::String(self.kind().as_str().into()));
        match self {
            Action::Tap { at } | Action::LongPress { at } | Action::DoubleClick { at } => {
                obj.insert("coordinate".into(), at.to_value());
            }
            Action::Swipe(SwipePath::Direction { direction, anchor }) => {
                obj.insert("direction".into(), direction.as_str().into());
                if let Some(anchor) = anchor {
                    obj.insert("coordinate".into(), anchor.to_value());
                }
            }
            Action::Swipe(SwipePath::Between { start, end }) => {
                obj.insert("start".into(), start.to_value());
                obj.insert("end".into(), end.to_value());
            }
            Action::Drag { start, end } => {
                obj.insert("start_coordinate".into(), start.to_value());
                obj.insert("end_coordinate".into(), end.to_value());
            }
            Action::Pinch { at, direction } => {
                obj.insert("coordinate".into(), at.to_value());
                obj.insert("direction".into(), direction.as_str().into());
            }
            Action::Rotate { at, direction } => {
                obj.insert("coordinate".into(), at.to_value());
                obj.insert("direction".into(), direction.as_str().into());
            }
            Action::Type { text } | Action::Note { text } | Action::Answer { text } => {
                obj.insert("text".into(), text.clone().into());
            }
            Action::Open { app } => {
                obj.insert("text".into(), app.clone().into());
            }
            Action::SystemButton(button) => {
                obj.insert("button".into(), button.as_str().into());
            }
            Action::Wait { seconds } => {
                obj.insert("duration".into(), (*seconds).into());
            }
            Action::Terminate(status) => {
                obj.insert("status".into(), status.as_str().into());
            }
            Action::AskUser { question } => {
                obj.insert("question".into(), question.clone().into());
            }
            Action::McpCall { tool, args } => {
                obj.insert("tool".into(), tool.clone().into());
                obj.insert("args".into(), Value::Object(args.clone()));
            }
        }
        Value::Object(obj)
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        validate_action(&value).map_err(serde::de::Error::custom)
    }
}

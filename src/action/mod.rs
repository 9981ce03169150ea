pub mod types;
pub mod validator;

pub use types::{
    Action, ActionKind, NormPoint, PinchDirection, RotateDirection, SwipeDirection, SwipePath,
    SystemButton, TerminateStatus,
};
pub use validator::{validate_action, ValidationError};

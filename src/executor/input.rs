// Gesture synthesis: turns a validated action into concrete device commands.
use std::time::Duration;

use crate::action::{
    Action, NormPoint, PinchDirection, RotateDirection, SwipeDirection, SwipePath, SystemButton,
    ValidationError,
};
use crate::config::GestureConfig;
use crate::device::PixelPoint;
use crate::executor::coordinator::CoordinateMapper;

/// A single-finger stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stroke {
    pub from: PixelPoint,
    pub to: PixelPoint,
}

/// What the dispatcher sends to the transport for one action.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    Tap(PixelPoint),
    DoubleTap {
        at: PixelPoint,
        interval_ms: u64,
    },
    LongPress {
        at: PixelPoint,
        duration_ms: u64,
    },
    Swipe {
        stroke: Stroke,
        duration_ms: u64,
    },
    /// Two-finger gestures, replayed as sequential single-finger strokes.
    Strokes {
        strokes: Vec<Stroke>,
        duration_ms: u64,
    },
    Type(String),
    Button(SystemButton),
    /// App name as the model wrote it; resolved to a package at dispatch.
    Launch(String),
    Wait(Duration),
    /// Handled by the step executor, never sent to the device.
    Control,
}

/// Maps `action` onto the screen. Coordinates outside `[0, 1]` fail here.
pub fn plan(
    action: &Action,
    mapper: &CoordinateMapper,
    gestures: &GestureConfig,
) -> Result<DeviceCommand, ValidationError> {
    let cmd = match action {
        Action::Tap { at } => DeviceCommand::Tap(mapper.to_pixels(*at, "coordinate")?),
        Action::DoubleClick { at } => DeviceCommand::DoubleTap {
            at: mapper.to_pixels(*at, "coordinate")?,
            interval_ms: gestures.double_tap_interval_ms,
        },
        Action::LongPress { at } => DeviceCommand::LongPress {
            at: mapper.to_pixels(*at, "coordinate")?,
            duration_ms: gestures.long_press_ms,
        },
        Action::Swipe(path) => DeviceCommand::Swipe {
            stroke: swipe_stroke(path, mapper)?,
            duration_ms: gestures.swipe_ms,
        },
        Action::Drag { start, end } => DeviceCommand::Swipe {
            stroke: Stroke {
                from: mapper.to_pixels(*start, "start_coordinate")?,
                to: mapper.to_pixels(*end, "end_coordinate")?,
            },
            duration_ms: gestures.drag_ms,
        },
        Action::Pinch { at, direction } => DeviceCommand::Strokes {
            strokes: pinch_strokes(
                mapper.to_pixels(*at, "coordinate")?,
                *direction,
                gestures.pinch_offset_px,
                mapper,
            ),
            duration_ms: gestures.swipe_ms,
        },
        Action::Rotate { at, direction } => DeviceCommand::Strokes {
            strokes: rotate_strokes(
                mapper.to_pixels(*at, "coordinate")?,
                *direction,
                gestures.rotate_offset_px,
                mapper,
            ),
            duration_ms: gestures.swipe_ms,
        },
        Action::Type { text } => DeviceCommand::Type(text.clone()),
        Action::SystemButton(button) => DeviceCommand::Button(*button),
        Action::Open { app } => DeviceCommand::Launch(app.clone()),
        Action::Wait { seconds } => DeviceCommand::Wait(Duration::from_secs(*seconds)),
        Action::Note { .. }
        | Action::Terminate(_)
        | Action::Answer { .. }
        | Action::AskUser { .. }
        | Action::McpCall { .. } => DeviceCommand::Control,
    };
    Ok(cmd)
}

/// A direction swipe spans half the shorter screen side, centred on the
/// anchor. `up` moves the finger towards the top of the screen.
fn swipe_stroke(path: &SwipePath, mapper: &CoordinateMapper) -> Result<Stroke, ValidationError> {
    match path {
        SwipePath::Between { start, end } => Ok(Stroke {
            from: mapper.to_pixels(*start, "start")?,
            to: mapper.to_pixels(*end, "end")?,
        }),
        SwipePath::Direction { direction, anchor } => {
            let anchor = mapper.to_pixels(anchor.unwrap_or(NormPoint::CENTER), "coordinate")?;
            let reach = mapper.screen().shorter_side() as i32 / 4;
            let (dx, dy) = match direction {
                SwipeDirection::Up => (0, -reach),
                SwipeDirection::Down => (0, reach),
                SwipeDirection::Left => (-reach, 0),
                SwipeDirection::Right => (reach, 0),
            };
            let size = mapper.screen();
            Ok(Stroke {
                from: anchor.offset(-dx, -dy).clamp_to(size),
                to: anchor.offset(dx, dy).clamp_to(size),
            })
        }
    }
}

fn pinch_strokes(
    center: PixelPoint,
    direction: PinchDirection,
    offset: i32,
    mapper: &CoordinateMapper,
) -> Vec<Stroke> {
    let size = mapper.screen();
    let near = |sign: i32| center.offset(sign * offset / 4, 0).clamp_to(size);
    let far = |sign: i32| center.offset(sign * offset, 0).clamp_to(size);
    [-1, 1]
        .into_iter()
        .map(|sign| match direction {
            PinchDirection::Out => Stroke {
                from: near(sign),
                to: far(sign),
            },
            PinchDirection::In => Stroke {
                from: far(sign),
                to: near(sign),
            },
        })
        .collect()
}

/// Two fingers on opposite sides of `center` each sweep a quarter turn.
fn rotate_strokes(
    center: PixelPoint,
    direction: RotateDirection,
    offset: i32,
    mapper: &CoordinateMapper,
) -> Vec<Stroke> {
    let size = mapper.screen();
    // Screen y grows downwards, so clockwise from (r, 0) is (0, r).
    let turn = match direction {
        RotateDirection::Clockwise => 1,
        RotateDirection::Counterclockwise => -1,
    };
    [1, -1]
        .into_iter()
        .map(|sign| Stroke {
            from: center.offset(sign * offset, 0).clamp_to(size),
            to: center.offset(0, sign * turn * offset).clamp_to(size),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ScreenSize;

    fn mapper() -> CoordinateMapper {
        CoordinateMapper::new(ScreenSize::new(1000, 2000))
    }

    fn swipe(action: Action) -> Stroke {
        match plan(&action, &mapper(), &GestureConfig::default()).unwrap() {
            DeviceCommand::Swipe { stroke, duration_ms } => {
                assert_eq!(duration_ms, 300);
                stroke
            }
            other => panic!("expected a swipe, got {other:?}"),
        }
    }

    #[test]
    fn test_direction_swipe_spans_half_the_shorter_side() {
        let up = swipe(Action::Swipe(SwipePath::Direction {
            direction: SwipeDirection::Up,
            anchor: None,
        }));
        assert_eq!(up.from, PixelPoint::new(500, 1250));
        assert_eq!(up.to, PixelPoint::new(500, 750));

        let right = swipe(Action::Swipe(SwipePath::Direction {
            direction: SwipeDirection::Right,
            anchor: Some(NormPoint::new(0.5, 0.1)),
        }));
        assert_eq!(right.from, PixelPoint::new(250, 200));
        assert_eq!(right.to, PixelPoint::new(750, 200));
    }

    #[test]
    fn test_direction_swipe_near_edge_is_clamped() {
        let down = swipe(Action::Swipe(SwipePath::Direction {
            direction: SwipeDirection::Down,
            anchor: Some(NormPoint::new(0.5, 1.0)),
        }));
        assert_eq!(down.to, PixelPoint::new(500, 1999));
    }

    #[test]
    fn test_explicit_swipe_and_drag() {
        let s = swipe(Action::Swipe(SwipePath::Between {
            start: NormPoint::new(0.1, 0.1),
            end: NormPoint::new(0.9, 0.9),
        }));
        assert_eq!((s.from, s.to), (PixelPoint::new(100, 200), PixelPoint::new(900, 1800)));

        let drag = plan(
            &Action::Drag {
                start: NormPoint::new(0.0, 0.0),
                end: NormPoint::new(0.5, 0.5),
            },
            &mapper(),
            &GestureConfig::default(),
        )
        .unwrap();
        assert!(matches!(drag, DeviceCommand::Swipe { duration_ms: 1000, .. }));
    }

    #[test]
    fn test_out_of_range_fails_with_field_name() {
        let err = plan(
            &Action::Drag {
                start: NormPoint::new(0.1, 0.1),
                end: NormPoint::new(1.5, 0.5),
            },
            &mapper(),
            &GestureConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.field, "end_coordinate");
    }

    #[test]
    fn test_pinch_out_moves_fingers_apart() {
        let cmd = plan(
            &Action::Pinch {
                at: NormPoint::CENTER,
                direction: PinchDirection::Out,
            },
            &mapper(),
            &GestureConfig::default(),
        )
        .unwrap();
        let DeviceCommand::Strokes { strokes, .. } = cmd else {
            panic!("expected strokes");
        };
        assert_eq!(strokes.len(), 2);
        for s in strokes {
            assert!((s.to.x - 500).abs() > (s.from.x - 500).abs());
        }
    }

    #[test]
    fn test_control_actions_do_not_touch_the_device() {
        for action in [
            Action::Note { text: "x".into() },
            Action::AskUser { question: "which one?".into() },
            Action::Answer { text: "42".into() },
        ] {
            assert_eq!(
                plan(&action, &mapper(), &GestureConfig::default()).unwrap(),
                DeviceCommand::Control
            );
        }
    }
}

// Model-space to device-space mapping.
use crate::action::{NormPoint, ValidationError};
use crate::device::{PixelPoint, ScreenSize};

/// Maps normalized `[0, 1]` points onto a fixed screen.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    size: ScreenSize,
}

impl CoordinateMapper {
    pub fn new(size: ScreenSize) -> Self {
        Self { size }
    }

    pub fn screen(&self) -> ScreenSize {
        self.size
    }

    /// Converts `point` to pixels. Components outside `[0, 1]` are rejected
    /// before scaling; the scaled result is clamped to the last pixel so that
    /// `1.0` lands on-screen.
    pub fn to_pixels(&self, point: NormPoint, field: &str) -> Result<PixelPoint, ValidationError> {
        for (axis, v) in [("x", point.x), ("y", point.y)] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(ValidationError::new(
                    field,
                    format!("{axis} = {v} is outside [0, 1]"),
                ));
            }
        }
        let x = (point.x * self.size.width as f64).floor() as i32;
        let y = (point.y * self.size.height as f64).floor() as i32;
        Ok(PixelPoint::new(x, y).clamp_to(self.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_points_land_on_screen() {
        for (w, h) in [(1080, 2400), (720, 1280), (1, 1), (1440, 3200)] {
            let mapper = CoordinateMapper::new(ScreenSize::new(w, h));
            for i in 0..=20 {
                for j in 0..=20 {
                    let p = NormPoint::new(i as f64 / 20.0, j as f64 / 20.0);
                    let px = mapper.to_pixels(p, "coordinate").unwrap();
                    assert!(px.x >= 0 && px.x <= w as i32 - 1, "{px} on {w}x{h}");
                    assert!(px.y >= 0 && px.y <= h as i32 - 1, "{px} on {w}x{h}");
                }
            }
        }
    }

    #[test]
    fn test_scaling_and_edge_clamp() {
        let mapper = CoordinateMapper::new(ScreenSize::new(1080, 2400));
        assert_eq!(
            mapper.to_pixels(NormPoint::new(0.5, 0.25), "coordinate").unwrap(),
            PixelPoint::new(540, 600)
        );
        assert_eq!(
            mapper.to_pixels(NormPoint::new(1.0, 1.0), "coordinate").unwrap(),
            PixelPoint::new(1079, 2399)
        );
        assert_eq!(
            mapper.to_pixels(NormPoint::new(0.0, 0.0), "coordinate").unwrap(),
            PixelPoint::new(0, 0)
        );
    }

    #[test]
    fn test_out_of_range_is_rejected_before_scaling() {
        let mapper = CoordinateMapper::new(ScreenSize::new(1080, 2400));
        for p in [
            NormPoint::new(-0.01, 0.5),
            NormPoint::new(0.5, 1.01),
            NormPoint::new(f64::NAN, 0.5),
            NormPoint::new(540.0, 1200.0),
        ] {
            let err = mapper.to_pixels(p, "start_coordinate").unwrap_err();
            assert_eq!(err.field, "start_coordinate");
        }
    }
}

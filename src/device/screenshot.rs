use std::io::Cursor;

use base64::Engine as _;
use image::imageops::FilterType;
use image::{ImageFormat, ImageReader};

use crate::errors::PilotResult;

/// A PNG screenshot as returned by the device.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl Screenshot {
    /// Wraps raw PNG bytes, reading the dimensions from the header only.
    pub fn from_png(png: Vec<u8>) -> PilotResult<Self> {
        let (width, height) = ImageReader::with_format(Cursor::new(&png), ImageFormat::Png)
            .into_dimensions()?;
        Ok(Self {
            png,
            width,
            height,
            captured_at: chrono::Utc::now(),
        })
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.png)
    }

    /// Base64 PNG sized for the model. The longer side is scaled down to
    /// `max_side` when it exceeds it; `0` sends the capture untouched.
    pub fn model_payload(&self, max_side: u32) -> PilotResult<String> {
        let longer = self.width.max(self.height);
        if max_side == 0 || longer <= max_side {
            return Ok(self.to_base64());
        }

        let scale = max_side as f64 / longer as f64;
        let w = ((self.width as f64 * scale).round() as u32).max(1);
        let h = ((self.height as f64 * scale).round() as u32).max(1);

        let decoded = image::load_from_memory_with_format(&self.png, ImageFormat::Png)?;
        let resized = decoded.resize_exact(w, h, FilterType::Triangle);
        let mut out = Vec::new();
        resized.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;

        tracing::debug!(
            from = %format!("{}x{}", self.width, self.height),
            to = %format!("{w}x{h}"),
            "screenshot downscaled for model"
        );
        Ok(base64::engine::general_purpose::STANDARD.encode(&out))
    }
}

#[cfg(test)]
pub(crate) fn blank_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::new(width, height);
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("encode png");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_dimensions_from_png() {
        let shot = Screenshot::from_png(blank_png(108, 240)).unwrap();
        assert_eq!((shot.width, shot.height), (108, 240));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Screenshot::from_png(b"not a png".to_vec()).is_err());
    }

    #[test]
    fn test_model_payload_downscales_longer_side() {
        let shot = Screenshot::from_png(blank_png(100, 200)).unwrap();
        assert_eq!(shot.model_payload(0).unwrap(), shot.to_base64());
        assert_eq!(shot.model_payload(400).unwrap(), shot.to_base64());

        let small = shot.model_payload(50).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(small).unwrap();
        let again = Screenshot::from_png(bytes).unwrap();
        assert_eq!((again.width, again.height), (25, 50));
    }
}

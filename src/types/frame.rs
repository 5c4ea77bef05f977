use crate::error::FrameError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::{DynamicImage, GenericImageView, RgbImage};
use std::sync::Arc;
use uuid::Uuid;

/// A captured camera frame.
///
/// The pixel data lives behind an `Arc`, so cloning a frame is cheap and
/// handing one to the detector worker copies a handle, never the buffer.
/// Nothing mutates the image after construction.
#[derive(Clone)]
pub struct CameraFrame {
    id: Uuid,
    image: Arc<DynamicImage>,
    captured_at: DateTime<Utc>,
}

impl CameraFrame {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            image: Arc::new(image),
            captured_at: Utc::now(),
        }
    }

    /// Build a frame from a raw RGB pixel buffer as delivered by a capture
    /// device.
    pub fn from_raw(width: u32, height: u32, pixels: Bytes) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        let rgb = RgbImage::from_raw(width, height, pixels.to_vec()).ok_or(
            FrameError::BufferSize {
                width,
                height,
                expected,
                actual: pixels.len(),
            },
        )?;
        Ok(Self::new(DynamicImage::ImageRgb8(rgb)))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn captured_at_ms(&self) -> i64 {
        self.captured_at.timestamp_millis()
    }
}

impl std::fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraFrame")
            .field("id", &self.id)
            .field("dimensions", &self.image.dimensions())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn cloning_frame_shares_image_buffer() {
        let img: DynamicImage = DynamicImage::ImageRgb8(
            ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(16, 16, Rgb([1, 2, 3])),
        );
        let f1 = CameraFrame::new(img);
        let f2 = f1.clone();
        assert!(Arc::ptr_eq(&f1.image, &f2.image));
    }

    #[test]
    fn from_raw_rejects_short_buffers() {
        let err = CameraFrame::from_raw(8, 8, Bytes::from_static(&[0u8; 10]));
        assert!(err.is_err());
    }

    #[test]
    fn from_raw_builds_rgb_frame() {
        let frame = CameraFrame::from_raw(4, 4, Bytes::from(vec![128u8; 4 * 4 * 3]))
            .expect("valid buffer");
        assert_eq!(frame.image().width(), 4);
        assert_eq!(frame.image().height(), 4);
    }
}

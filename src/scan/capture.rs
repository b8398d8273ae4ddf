//! Camera captures and the rate-limited capture buffer.

use std::sync::Arc;

use image::RgbaImage;
use nalgebra::Matrix4;

use crate::error::{BakeError, Result};

/// One (image, view-projection) sample taken during a scan.
#[derive(Debug, Clone)]
pub struct Capture {
    /// Session time in seconds.
    pub timestamp: f64,
    /// Straight-alpha RGBA8 color image. Row 0 is the top of the camera frame.
    pub image: Arc<RgbaImage>,
    /// World to clip transform of the camera at capture time.
    pub view_projection: Matrix4<f32>,
}

impl Capture {
    /// Create a capture from a decoded image.
    pub fn new(timestamp: f64, image: RgbaImage, view_projection: Matrix4<f32>) -> Self {
        Self {
            timestamp,
            image: Arc::new(image),
            view_projection,
        }
    }

    /// Decode a PNG or JPEG capture.
    ///
    /// # Errors
    ///
    /// `ResourceUnavailable` if the bytes cannot be decoded or the image is empty.
    pub fn from_encoded(
        timestamp: f64,
        bytes: &[u8],
        view_projection: Matrix4<f32>,
    ) -> Result<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| BakeError::unavailable("capture image", e))?
            .to_rgba8();
        if image.width() == 0 || image.height() == 0 {
            return Err(BakeError::unavailable("capture image", "image is empty"));
        }
        Ok(Self::new(timestamp, image, view_projection))
    }

    /// Image width and height in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Whether the image has no pixels.
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}

/// Options for [`CaptureBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    /// Minimum spacing between accepted captures, in seconds.
    pub min_interval: f64,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self { min_interval: 0.5 }
    }
}

impl CaptureOptions {
    /// Set the minimum spacing between accepted captures.
    pub fn with_min_interval(mut self, seconds: f64) -> Self {
        self.min_interval = seconds;
        self
    }
}

/// What happened to a capture offered to a [`CaptureBuffer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureOutcome {
    /// The capture was appended.
    Accepted,
    /// The capture came less than the minimum interval after the last one.
    TooSoon {
        /// Timestamp of the last accepted capture.
        previous: f64,
    },
    /// The session had no geometry to bake onto.
    NoGeometry,
    /// The timestamp was NaN or infinite.
    InvalidTimestamp,
}

impl CaptureOutcome {
    /// Whether the capture was stored.
    pub fn is_accepted(self) -> bool {
        self == CaptureOutcome::Accepted
    }
}

/// Append-only, time-ordered and temporally sparse sequence of captures.
///
/// A capture is accepted only if its timestamp is at least
/// [`CaptureOptions::min_interval`] after the last accepted one. A capture at
/// an earlier time than the last one is rejected the same way, so timestamps
/// are strictly increasing. Non-finite timestamps are never accepted.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    options: CaptureOptions,
    captures: Vec<Arc<Capture>>,
}

impl CaptureBuffer {
    /// Create an empty buffer with default spacing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with the given options.
    pub fn with_options(options: CaptureOptions) -> Self {
        Self {
            options,
            captures: Vec::new(),
        }
    }

    /// The buffer options.
    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Offer a capture to the buffer.
    pub fn push(&mut self, capture: Capture) -> CaptureOutcome {
        if !capture.timestamp.is_finite() {
            log::debug!("Rejecting capture with timestamp {}", capture.timestamp);
            return CaptureOutcome::InvalidTimestamp;
        }
        if let Some(last) = self.captures.last() {
            let elapsed = capture.timestamp - last.timestamp;
            if !(elapsed >= self.options.min_interval) {
                log::debug!(
                    "Rejecting capture at t={:.3}s, {:.3}s after the previous one",
                    capture.timestamp,
                    elapsed
                );
                return CaptureOutcome::TooSoon {
                    previous: last.timestamp,
                };
            }
        }
        self.captures.push(Arc::new(capture));
        CaptureOutcome::Accepted
    }

    /// All accepted captures, oldest first.
    pub fn captures(&self) -> &[Arc<Capture>] {
        &self.captures
    }

    /// Timestamp of the last accepted capture.
    pub fn last_timestamp(&self) -> Option<f64> {
        self.captures.last().map(|c| c.timestamp)
    }

    /// Number of captures.
    pub fn len(&self) -> usize {
        self.captures.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }

    /// Drop every capture.
    pub fn clear(&mut self) {
        self.captures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(t: f64) -> Capture {
        Capture::new(t, RgbaImage::new(2, 2), Matrix4::identity())
    }

    #[test]
    fn test_rejects_capture_within_interval() {
        let mut buffer = CaptureBuffer::new();
        assert!(buffer.push(capture(0.0)).is_accepted());
        assert_eq!(
            buffer.push(capture(0.3)),
            CaptureOutcome::TooSoon { previous: 0.0 }
        );
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.last_timestamp(), Some(0.0));
    }

    #[test]
    fn test_accepts_spaced_captures() {
        let mut buffer = CaptureBuffer::new();
        assert!(buffer.push(capture(0.0)).is_accepted());
        assert!(buffer.push(capture(0.6)).is_accepted());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_exact_interval_is_accepted() {
        let mut buffer = CaptureBuffer::new();
        buffer.push(capture(1.0));
        assert!(buffer.push(capture(1.5)).is_accepted());
    }

    #[test]
    fn test_rejects_out_of_order() {
        let mut buffer = CaptureBuffer::new();
        buffer.push(capture(2.0));
        assert!(!buffer.push(capture(0.0)).is_accepted());
        assert!(!buffer.push(capture(f64::NAN)).is_accepted());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_non_finite_timestamp_never_accepted() {
        let mut buffer = CaptureBuffer::new();
        assert_eq!(buffer.push(capture(f64::NAN)), CaptureOutcome::InvalidTimestamp);
        assert_eq!(buffer.push(capture(f64::INFINITY)), CaptureOutcome::InvalidTimestamp);
        assert!(buffer.is_empty());

        // Ingestion carries on normally afterwards
        assert!(buffer.push(capture(10.0)).is_accepted());
        assert!(buffer.push(capture(100.0)).is_accepted());
        assert_eq!(
            buffer.push(capture(f64::NEG_INFINITY)),
            CaptureOutcome::InvalidTimestamp
        );
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_rejected_capture_does_not_move_window() {
        let mut buffer = CaptureBuffer::new();
        buffer.push(capture(0.0));
        buffer.push(capture(0.3));
        // Spacing is measured from the last accepted capture
        assert!(buffer.push(capture(0.5)).is_accepted());
    }

    #[test]
    fn test_custom_interval() {
        let mut buffer = CaptureBuffer::with_options(CaptureOptions::default().with_min_interval(0.0));
        buffer.push(capture(0.0));
        assert!(buffer.push(capture(0.0)).is_accepted());
    }

    #[test]
    fn test_from_encoded() {
        let mut bytes = Vec::new();
        let image = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        image
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let capture = Capture::from_encoded(1.0, &bytes, Matrix4::identity()).unwrap();
        assert_eq!(capture.dimensions(), (3, 2));
        assert_eq!(capture.image.get_pixel(2, 1).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_from_encoded_garbage() {
        let err = Capture::from_encoded(0.0, b"not an image", Matrix4::identity()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ResourceUnavailable);
    }
}

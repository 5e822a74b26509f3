use chrono::{DateTime, TimeZone, Utc};
use image::RgbImage;

/// A decoded video frame with timestamp metadata.
///
/// The pixel buffer is never mutated once the frame has entered the
/// pipeline; overlays are drawn on a copy.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            image,
            captured_at_ms,
            seq,
        }
    }

    /// Wrap an image with the current wall-clock time.
    pub fn now(image: RgbImage, seq: u64) -> Self {
        Self::new(image, Utc::now().timestamp_millis(), seq)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Suggested file name for a snapshot of this frame,
    /// e.g. "snapshot_1739871000.jpg".
    pub fn snapshot_name(&self, prefix: &str) -> String {
        format!("{prefix}{secs}.jpg", secs = self.captured_at_ms.div_euclid(1000))
    }

    /// UTC calendar date of the capture, e.g. "2026-02-18".
    pub fn date_str(&self) -> String {
        let dt: DateTime<Utc> = Utc
            .timestamp_millis_opt(self.captured_at_ms)
            .single()
            .unwrap_or_else(Utc::now);
        dt.format("%Y-%m-%d").to_string()
    }
}

use sono_guide_common::frame::Frame;

use super::Detection;

/// Object detection capability invoked once per frame.
///
/// Implementations return zero or more candidate boxes in pixel space with
/// confidences in `[0, 1]`. A frame without objects yields an empty list,
/// never an error.
pub trait ObjectDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("detector backend failed: {0}")]
    Backend(String),
    #[error("frame {width}x{height} is too small for detection")]
    FrameTooSmall { width: u32, height: u32 },
}

/// Detector that never finds anything.
#[derive(Debug, Default)]
pub struct NullDetector;

impl ObjectDetector for NullDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "none"
    }
}

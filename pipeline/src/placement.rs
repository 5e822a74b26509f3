use sono_guide_common::config::PlacementConfig;

use crate::detection::Detection;
use crate::quality::QualityVerdict;

/// Per-frame standard-view decision for one detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementVerdict {
    pub is_standard_view: bool,
    pub is_centered: bool,
    pub center: (f32, f32),
    pub box_size: (f32, f32),
}

/// Decides whether a detection forms a standard view.
///
/// The target must be confident enough, its center must fall inside the
/// middle band of the frame on both axes, and the latest quality verdict
/// must be acceptable. No state is kept between frames.
#[derive(Debug, Clone)]
pub struct PlacementEvaluator {
    view_confidence: f32,
    center_margin: f32,
}

impl PlacementEvaluator {
    pub fn new(config: &PlacementConfig) -> Self {
        Self {
            view_confidence: config.view_confidence,
            center_margin: config.center_margin,
        }
    }

    pub fn evaluate(
        &self,
        detection: &Detection,
        frame_width: u32,
        frame_height: u32,
        quality: Option<&QualityVerdict>,
    ) -> PlacementVerdict {
        let (cx, cy) = detection.bbox.center();
        let (w, h) = (frame_width as f32, frame_height as f32);
        let margin_x = w * self.center_margin;
        let margin_y = h * self.center_margin;

        let is_centered = (cx - w / 2.0).abs() < margin_x && (cy - h / 2.0).abs() < margin_y;
        let quality_ok = quality.is_some_and(|q| q.acceptable);

        PlacementVerdict {
            is_standard_view: detection.confidence > self.view_confidence
                && is_centered
                && quality_ok,
            is_centered,
            center: (cx, cy),
            box_size: (detection.bbox.width(), detection.bbox.height()),
        }
    }
}

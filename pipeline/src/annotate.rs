use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use sono_guide_common::frame::Frame;

use crate::detection::Detection;
use crate::placement::PlacementVerdict;

pub const COLOR_OPTIMAL: Rgb<u8> = Rgb([0, 255, 0]);
pub const COLOR_SEARCHING: Rgb<u8> = Rgb([255, 0, 0]);
pub const COLOR_CENTER_MARKER: Rgb<u8> = Rgb([0, 255, 255]);

const OPTIMAL_THICKNESS: i32 = 4;
const SEARCHING_THICKNESS: i32 = 2;
const CENTER_MARKER_RADIUS: i32 = 5;
const LABEL_OFFSET: i32 = 10;
const PROGRESS_BAR_HEIGHT: u32 = 6;
const PROGRESS_BAR_GAP: i32 = 4;

/// Text to render next to the detection box. Glyphs are left to the
/// presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLabel {
    pub text: String,
    pub anchor: (i32, i32),
    pub color: Rgb<u8>,
}

#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub label: Option<OverlayLabel>,
}

impl AnnotatedFrame {
    /// The frame as-is, without any overlay.
    pub fn plain(frame: &Frame) -> Self {
        Self {
            image: frame.image.clone(),
            label: None,
        }
    }
}

/// Draws the operator overlay on a copy of the frame.
#[derive(Debug, Clone, Default)]
pub struct FrameAnnotator;

impl FrameAnnotator {
    pub fn new() -> Self {
        Self
    }

    /// `stable_frames` is the current run length shown against `threshold`
    /// while the view is optimal.
    pub fn annotate(
        &self,
        frame: &Frame,
        detection: Option<&Detection>,
        placement: Option<&PlacementVerdict>,
        stable_frames: u32,
        threshold: u32,
    ) -> AnnotatedFrame {
        let mut image = frame.image.clone();
        let mut label = None;

        let (fw, fh) = frame.dimensions();
        let visible = detection.and_then(|det| det.bbox.clipped_to(fw, fh).map(|b| (det, b)));

        if let Some((det, bbox)) = visible {
            let optimal = placement.is_some_and(|p| p.is_standard_view);
            let x1 = bbox.x1.round() as i32;
            let y1 = bbox.y1.round() as i32;
            let w = bbox.width().round().max(1.0) as u32;
            let h = bbox.height().round().max(1.0) as u32;

            let (color, thickness, text) = if optimal {
                (
                    COLOR_OPTIMAL,
                    OPTIMAL_THICKNESS,
                    format!("OPTIMAL VIEW ({stable_frames}/{threshold})"),
                )
            } else {
                (
                    COLOR_SEARCHING,
                    SEARCHING_THICKNESS,
                    format!("Searching... {:.2}", det.confidence),
                )
            };

            draw_thick_rect(&mut image, x1, y1, w, h, thickness, color);

            if optimal && threshold > 0 {
                let filled = (w as u64 * stable_frames.min(threshold) as u64 / threshold as u64) as u32;
                if filled > 0 {
                    let bar_y = y1
                        .saturating_sub(PROGRESS_BAR_GAP + PROGRESS_BAR_HEIGHT as i32)
                        .saturating_sub(thickness);
                    draw_filled_rect_mut(
                        &mut image,
                        Rect::at(x1, bar_y).of_size(filled, PROGRESS_BAR_HEIGHT),
                        color,
                    );
                }
            }

            label = Some(OverlayLabel {
                text,
                anchor: (x1, y1.saturating_sub(LABEL_OFFSET)),
                color,
            });
        }

        draw_filled_circle_mut(
            &mut image,
            ((fw / 2) as i32, (fh / 2) as i32),
            CENTER_MARKER_RADIUS,
            COLOR_CENTER_MARKER,
        );

        AnnotatedFrame { image, label }
    }
}

/// Hollow rectangle with the stroke centered on the box outline.
fn draw_thick_rect(
    image: &mut RgbImage,
    x: i32,
    y: i32,
    w: u32,
    h: u32,
    thickness: i32,
    color: Rgb<u8>,
) {
    for i in 0..thickness {
        let offset = i - thickness / 2;
        let rw = w as i64 - 2 * offset as i64;
        let rh = h as i64 - 2 * offset as i64;
        if rw < 1 || rh < 1 {
            continue;
        }
        let rect = Rect::at(x.saturating_add(offset), y.saturating_add(offset))
            .of_size(rw as u32, rh as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    const BACKGROUND: Rgb<u8> = Rgb([50, 50, 50]);

    fn frame() -> Frame {
        Frame::new(RgbImage::from_pixel(640, 480, BACKGROUND), 0, 0)
    }

    fn placement(is_standard_view: bool) -> PlacementVerdict {
        PlacementVerdict {
            is_standard_view,
            is_centered: is_standard_view,
            center: (320.0, 240.0),
            box_size: (200.0, 100.0),
        }
    }

    fn detection(confidence: f32) -> Detection {
        Detection::new(BoundingBox::new(100.0, 100.0, 300.0, 200.0), confidence)
    }

    #[test]
    fn no_detection_draws_only_center_marker() {
        let f = frame();
        let out = FrameAnnotator::new().annotate(&f, None, None, 0, 30);
        assert!(out.label.is_none());
        assert_eq!(*out.image.get_pixel(320, 240), COLOR_CENTER_MARKER);
        assert_eq!(*out.image.get_pixel(100, 100), BACKGROUND);
        let changed = out
            .image
            .pixels()
            .zip(f.image.pixels())
            .filter(|(a, b)| a != b)
            .count();
        // Filled disc of radius 5.
        assert!(changed > 50 && changed < 130, "changed = {changed}");
    }

    #[test]
    fn optimal_view_is_green_with_progress_label() {
        let out = FrameAnnotator::new().annotate(
            &frame(),
            Some(&detection(0.8)),
            Some(&placement(true)),
            12,
            30,
        );
        assert_eq!(*out.image.get_pixel(150, 100), COLOR_OPTIMAL);
        let label = out.label.unwrap();
        assert_eq!(label.text, "OPTIMAL VIEW (12/30)");
        assert_eq!(label.anchor, (100, 90));
        assert_eq!(label.color, COLOR_OPTIMAL);
    }

    #[test]
    fn searching_view_is_red_with_confidence_label() {
        let out = FrameAnnotator::new().annotate(
            &frame(),
            Some(&detection(0.55)),
            Some(&placement(false)),
            0,
            30,
        );
        assert_eq!(*out.image.get_pixel(150, 100), COLOR_SEARCHING);
        assert_eq!(out.label.unwrap().text, "Searching... 0.55");
    }

    #[test]
    fn input_frame_is_left_untouched() {
        let f = frame();
        FrameAnnotator::new().annotate(&f, Some(&detection(0.9)), Some(&placement(true)), 29, 30);
        assert!(f.image.pixels().all(|p| *p == BACKGROUND));
    }

    #[test]
    fn box_at_frame_edge_does_not_panic() {
        let det = Detection::new(BoundingBox::new(-20.0, -20.0, 700.0, 500.0), 0.7);
        let out = FrameAnnotator::new().annotate(&frame(), Some(&det), Some(&placement(true)), 30, 30);
        assert!(out.label.is_some());
    }

    #[test]
    fn extreme_coordinates_are_clipped() {
        let det = Detection::new(BoundingBox::new(-3.0e9, -3.0e9, 100.0, 100.0), 0.9);
        let out = FrameAnnotator::new().annotate(&frame(), Some(&det), Some(&placement(true)), 5, 30);
        assert_eq!(*out.image.get_pixel(50, 100), COLOR_OPTIMAL);
        assert_eq!(out.label.unwrap().anchor, (0, -10));
    }

    #[test]
    fn box_outside_frame_draws_nothing() {
        let det = Detection::new(BoundingBox::new(-3.0e9, -3.0e9, -1.0e9, -1.0e9), 0.9);
        let out = FrameAnnotator::new().annotate(&frame(), Some(&det), None, 0, 30);
        assert!(out.label.is_none());
        assert_eq!(*out.image.get_pixel(0, 0), BACKGROUND);
    }
}

use image::imageops::FilterType;
use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use sono_guide_common::config::DetectionConfig;
use sono_guide_common::frame::Frame;
use tracing::debug;

use super::traits::{DetectionError, ObjectDetector};
use super::{BoundingBox, Detection};

/// Bright-region detector.
///
/// Downsamples the frame to luma, thresholds it, labels 8-connected
/// foreground regions, and reports every region covering at least
/// `min_area_fraction` of the frame. Confidence is the region's fill ratio
/// (region area divided by its bounding box area), so compact rounded
/// targets score high and thin streaks score low.
pub struct BlobDetector {
    threshold: u8,
    min_area_fraction: f32,
    downsample: u32,
}

#[derive(Debug, Clone, Copy)]
struct RegionStats {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    area: u32,
}

impl BlobDetector {
    pub fn new(threshold: u8, min_area_fraction: f32, downsample: u32) -> Self {
        Self {
            threshold,
            min_area_fraction,
            downsample: downsample.max(1),
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            config.blob_threshold,
            config.min_area_fraction,
            config.downsample,
        )
    }

    fn binarize(&self, frame: &Frame) -> Result<GrayImage, DetectionError> {
        let (width, height) = frame.dimensions();
        let small_w = width / self.downsample;
        let small_h = height / self.downsample;
        if small_w == 0 || small_h == 0 {
            return Err(DetectionError::FrameTooSmall { width, height });
        }

        let small = image::imageops::resize(&frame.image, small_w, small_h, FilterType::Nearest);
        let gray = image::imageops::grayscale(&small);
        let threshold = self.threshold;
        Ok(GrayImage::from_fn(small_w, small_h, |x, y| {
            if gray.get_pixel(x, y)[0] > threshold {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        }))
    }
}

impl ObjectDetector for BlobDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let binary = self.binarize(frame)?;
        let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

        let mut regions: Vec<Option<RegionStats>> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0] as usize;
            if label == 0 {
                continue;
            }
            if regions.len() <= label {
                regions.resize(label + 1, None);
            }
            let stats = regions[label].get_or_insert(RegionStats {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
                area: 0,
            });
            stats.min_x = stats.min_x.min(x);
            stats.min_y = stats.min_y.min(y);
            stats.max_x = stats.max_x.max(x);
            stats.max_y = stats.max_y.max(y);
            stats.area += 1;
        }

        let (small_w, small_h) = binary.dimensions();
        let min_area = self.min_area_fraction * (small_w * small_h) as f32;
        let sx = frame.width() as f32 / small_w as f32;
        let sy = frame.height() as f32 / small_h as f32;

        let detections: Vec<Detection> = regions
            .into_iter()
            .flatten()
            .filter(|r| r.area as f32 >= min_area)
            .map(|r| {
                let box_w = r.max_x - r.min_x + 1;
                let box_h = r.max_y - r.min_y + 1;
                let fill = r.area as f32 / (box_w * box_h) as f32;
                let bbox = BoundingBox::new(
                    r.min_x as f32 * sx,
                    r.min_y as f32 * sy,
                    (r.max_x + 1) as f32 * sx,
                    (r.max_y + 1) as f32 * sy,
                );
                Detection::new(bbox, fill.clamp(0.0, 1.0))
            })
            .collect();

        debug!(
            candidates = detections.len(),
            seq = frame.seq,
            "blob detection complete"
        );
        Ok(detections)
    }

    fn name(&self) -> &str {
        "blob"
    }
}

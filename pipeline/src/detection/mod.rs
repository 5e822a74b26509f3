pub mod blob;
pub mod traits;

use tracing::debug;

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left and
/// `(x2, y2)` bottom-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box of the given size centered on `(cx, cy)`.
    pub fn centered_at(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(
            cx - width / 2.0,
            cy - height / 2.0,
            cx + width / 2.0,
            cy + height / 2.0,
        )
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Intersection with a `width` x `height` frame, or `None` when the box
    /// lies entirely outside it.
    pub fn clipped_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        if !self.is_well_formed() {
            return None;
        }
        let clipped = BoundingBox::new(
            self.x1.max(0.0),
            self.y1.max(0.0),
            self.x2.min(width as f32),
            self.y2.min(height as f32),
        );
        (clipped.x2 > clipped.x1 && clipped.y2 > clipped.y1).then_some(clipped)
    }

    fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x2 > self.x1
            && self.y2 > self.y1
    }
}

/// One candidate object reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }

    /// This detection with its box clipped to the frame. Malformed or
    /// off-frame detections yield `None`.
    pub fn within_frame(&self, width: u32, height: u32) -> Option<Detection> {
        if !self.is_well_formed() {
            return None;
        }
        let bbox = self.bbox.clipped_to(width, height)?;
        Some(Detection::new(bbox, self.confidence))
    }

    fn is_well_formed(&self) -> bool {
        self.confidence.is_finite()
            && (0.0..=1.0).contains(&self.confidence)
            && self.bbox.is_well_formed()
    }
}

/// Picks the single best detection from a detector's raw output.
#[derive(Debug, Clone)]
pub struct DetectionInterpreter {
    min_confidence: f32,
}

impl DetectionInterpreter {
    pub fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    /// Highest-confidence detection strictly above the minimum.
    ///
    /// Malformed entries are ignored. Ties keep the first one seen.
    pub fn select_best(&self, detections: &[Detection]) -> Option<Detection> {
        let mut best: Option<Detection> = None;
        for det in detections {
            if !det.is_well_formed() {
                debug!(?det, "dropping malformed detection");
                continue;
            }
            if det.confidence <= self.min_confidence {
                continue;
            }
            if best.map_or(true, |b| det.confidence > b.confidence) {
                best = Some(*det);
            }
        }
        best
    }

    /// Like [`select_best`](Self::select_best), but boxes are first clipped
    /// to the frame and those entirely outside it are dropped.
    pub fn select_best_in_frame(
        &self,
        detections: &[Detection],
        width: u32,
        height: u32,
    ) -> Option<Detection> {
        let visible: Vec<Detection> = detections
            .iter()
            .filter_map(|d| {
                let clipped = d.within_frame(width, height);
                if clipped.is_none() {
                    debug!(det = ?d, "dropping detection outside the frame");
                }
                clipped
            })
            .collect();
        self.select_best(&visible)
    }
}

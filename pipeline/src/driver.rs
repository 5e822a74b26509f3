use sono_guide_common::config::Config;
use sono_guide_common::frame::Frame;
use tracing::{debug, info, warn};

use crate::annotate::{AnnotatedFrame, FrameAnnotator};
use crate::detection::traits::ObjectDetector;
use crate::detection::{Detection, DetectionInterpreter};
use crate::placement::{PlacementEvaluator, PlacementVerdict};
use crate::quality::{QualityAssessor, QualityVerdict};
use crate::stability::{CaptureEvent, StabilityState, StabilityTracker, StabilityUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Ok,
    Warning,
    Error,
    Capture,
}

/// Short status line for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub text: String,
    pub severity: Severity,
}

impl Status {
    fn new(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            text: text.into(),
            severity,
        }
    }
}

/// Everything the presentation layer needs after one frame.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub annotated: AnnotatedFrame,
    pub status: Status,
    pub capture: Option<CaptureEvent>,
    pub detection: Option<Detection>,
    pub placement: Option<PlacementVerdict>,
    pub stability: StabilityState,
}

/// Runs the per-frame decision pipeline.
///
/// Frames must be fed strictly in order, one at a time. The driver owns the
/// frame counter, the cached quality verdict and the stability tracker; no
/// other component touches them.
pub struct PipelineDriver {
    assessor: QualityAssessor,
    interpreter: DetectionInterpreter,
    placement: PlacementEvaluator,
    tracker: StabilityTracker,
    annotator: FrameAnnotator,
    detector: Box<dyn ObjectDetector>,
    eval_interval: u64,
    file_prefix: String,
    frame_count: u64,
    quality: Option<QualityVerdict>,
    detection_enabled: bool,
    pending_failure: Option<String>,
}

impl PipelineDriver {
    pub fn new(config: &Config, detector: Box<dyn ObjectDetector>) -> Self {
        let threshold = config.stability.effective_threshold(config.source.fps);
        info!(
            detector = detector.name(),
            threshold,
            cooldown_ms = config.stability.cooldown_ms(),
            eval_interval = config.quality.eval_interval,
            "pipeline driver ready"
        );
        Self {
            assessor: QualityAssessor::new(&config.quality),
            interpreter: DetectionInterpreter::new(config.detection.min_confidence),
            placement: PlacementEvaluator::new(&config.placement),
            tracker: StabilityTracker::new(threshold, config.stability.cooldown_ms()),
            annotator: FrameAnnotator::new(),
            detector,
            eval_interval: config.quality.eval_interval.max(1),
            file_prefix: config.storage.file_prefix.clone(),
            frame_count: 0,
            quality: None,
            detection_enabled: config.detection.enabled,
            pending_failure: None,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn latest_quality(&self) -> Option<&QualityVerdict> {
        self.quality.as_ref()
    }

    pub fn stability_state(&self) -> StabilityState {
        self.tracker.state()
    }

    pub fn detection_enabled(&self) -> bool {
        self.detection_enabled
    }

    pub fn set_detection_enabled(&mut self, enabled: bool) {
        if enabled != self.detection_enabled {
            info!(enabled, "detection overlay toggled");
        }
        self.detection_enabled = enabled;
        if !enabled {
            self.tracker.hold();
        }
    }

    pub fn toggle_detection(&mut self) -> bool {
        self.set_detection_enabled(!self.detection_enabled);
        self.detection_enabled
    }

    /// Surface a failed snapshot write on the next frame's status line.
    pub fn report_persistence_failure(&mut self, file_name: &str, reason: &str) {
        self.pending_failure = Some(format!("SNAPSHOT FAILED: {file_name} ({reason})"));
    }

    pub fn process_frame(&mut self, frame: &Frame) -> FrameOutput {
        if self.frame_count % self.eval_interval == 0 {
            self.quality = Some(self.assessor.evaluate(&frame.image));
        }
        self.frame_count += 1;

        let failure = self.pending_failure.take();

        if !self.detection_enabled {
            self.tracker.hold();
            let status = self.status(failure, false, 0);
            return FrameOutput {
                annotated: AnnotatedFrame::plain(frame),
                status,
                capture: None,
                detection: None,
                placement: None,
                stability: self.tracker.state(),
            };
        }

        let (width, height) = frame.dimensions();
        let detection = match self.detector.detect(frame) {
            Ok(raw) => self.interpreter.select_best_in_frame(&raw, width, height),
            Err(e) => {
                warn!(
                    error = %e,
                    seq = frame.seq,
                    detector = self.detector.name(),
                    "detection failed, treating as no target"
                );
                None
            }
        };

        let placement = detection
            .as_ref()
            .map(|d| self.placement.evaluate(d, width, height, self.quality.as_ref()));
        let is_standard_view = placement.is_some_and(|p| p.is_standard_view);

        let threshold = self.tracker.threshold();
        let update = self.tracker.update(is_standard_view, frame.captured_at_ms);
        let shown_run = match update {
            StabilityUpdate::Accumulating(n) => n,
            StabilityUpdate::Triggered | StabilityUpdate::Suppressed => threshold,
            StabilityUpdate::Reset => 0,
        };

        let capture = (update == StabilityUpdate::Triggered).then(|| {
            let file_name = frame.snapshot_name(&self.file_prefix);
            info!(file_name, seq = frame.seq, "auto-capture");
            CaptureEvent {
                frame: frame.clone(),
                timestamp_ms: frame.captured_at_ms,
                file_name,
            }
        });

        let annotated = self.annotator.annotate(
            frame,
            detection.as_ref(),
            placement.as_ref(),
            shown_run,
            threshold,
        );

        let status = match &capture {
            Some(event) => {
                // A failure report waits for the next frame.
                self.pending_failure = failure;
                Status::new(
                    format!("SNAPSHOT SAVED: {}", event.file_name),
                    Severity::Capture,
                )
            }
            None => self.status(failure, is_standard_view, shown_run),
        };

        debug!(
            seq = frame.seq,
            detected = detection.is_some(),
            is_standard_view,
            run = shown_run,
            status = status.text,
            "frame processed"
        );

        FrameOutput {
            annotated,
            status,
            capture,
            detection,
            placement,
            stability: self.tracker.state(),
        }
    }

    fn status(&self, failure: Option<String>, is_standard_view: bool, run: u32) -> Status {
        if let Some(text) = failure {
            return Status::new(text, Severity::Error);
        }
        match &self.quality {
            None => Status::new("Status: INITIALIZING...", Severity::Warning),
            Some(q) if !q.acceptable => {
                Status::new(format!("WARNING: {}", q.issues.join(", ")), Severity::Warning)
            }
            Some(_) if is_standard_view => Status::new(
                format!("OPTIMAL VIEW ({run}/{})", self.tracker.threshold()),
                Severity::Ok,
            ),
            Some(_) => Status::new("Status: CALIBRATION OK", Severity::Ok),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::COLOR_CENTER_MARKER;
    use crate::detection::traits::DetectionError;
    use crate::detection::BoundingBox;
    use image::{Rgb, RgbImage};

    const FRAME_MS: i64 = 66;
    const START_MS: i64 = 1_739_871_000_000;

    /// Reports the same detections on every frame.
    struct FixedDetector(Vec<Detection>);

    impl ObjectDetector for FixedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
            Ok(self.0.clone())
        }
    }

    struct FailingDetector;

    impl ObjectDetector for FailingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
            Err(DetectionError::Backend("model not loaded".into()))
        }
    }

    /// Mid-gray 1-pixel checkerboard: bright enough, low noise, sharp.
    fn good_image() -> RgbImage {
        RgbImage::from_fn(640, 480, |x, y| {
            let v = if (x + y) % 2 == 0 { 100 } else { 140 };
            Rgb([v, v, v])
        })
    }

    fn dark_image() -> RgbImage {
        RgbImage::from_pixel(640, 480, Rgb([5, 5, 5]))
    }

    fn centered(confidence: f32) -> Box<dyn ObjectDetector> {
        Box::new(FixedDetector(vec![Detection::new(
            BoundingBox::centered_at(320.0, 240.0, 120.0, 90.0),
            confidence,
        )]))
    }

    fn frame(image: &RgbImage, seq: u64) -> Frame {
        Frame::new(image.clone(), START_MS + seq as i64 * FRAME_MS, seq)
    }

    /// Run `n` frames, returning the 1-based indices of frames that captured.
    fn run(driver: &mut PipelineDriver, image: &RgbImage, n: u64) -> Vec<u64> {
        (0..n)
            .filter_map(|seq| {
                let out = driver.process_frame(&frame(image, seq));
                out.capture.map(|_| seq + 1)
            })
            .collect()
    }

    #[test]
    fn centered_confident_target_captures_on_frame_thirty() {
        let mut driver = PipelineDriver::new(&Config::default(), centered(0.8));
        let image = good_image();

        for seq in 0..29 {
            let out = driver.process_frame(&frame(&image, seq));
            assert!(out.capture.is_none(), "unexpected capture at frame {}", seq + 1);
            assert_eq!(out.stability.consecutive_good_frames, seq as u32 + 1);
            assert_eq!(out.status.text, format!("OPTIMAL VIEW ({}/30)", seq + 1));
        }

        let out = driver.process_frame(&frame(&image, 29));
        let event = out.capture.expect("capture on frame 30");
        assert_eq!(event.timestamp_ms, START_MS + 29 * FRAME_MS);
        assert_eq!(event.file_name, "snapshot_1739871001.jpg");
        assert_eq!(event.frame.image, image);
        assert_eq!(out.status.severity, Severity::Capture);
        assert_eq!(out.status.text, "SNAPSHOT SAVED: snapshot_1739871001.jpg");
        assert_eq!(out.stability.consecutive_good_frames, 0);
    }

    #[test]
    fn continuous_view_is_debounced_by_cooldown() {
        let mut driver = PipelineDriver::new(&Config::default(), centered(0.8));
        // 60 frames span ~3.9 s; the second full run ends 1.98 s after the first capture.
        assert_eq!(run(&mut driver, &good_image(), 60), vec![30]);
        // The third run ends ~3.96 s after the first capture.
        assert_eq!(run_from(&mut driver, &good_image(), 60, 30), vec![90]);
    }

    fn run_from(driver: &mut PipelineDriver, image: &RgbImage, start: u64, n: u64) -> Vec<u64> {
        (start..start + n)
            .filter_map(|seq| driver.process_frame(&frame(image, seq)).capture.map(|_| seq + 1))
            .collect()
    }

    #[test]
    fn low_confidence_never_captures() {
        let mut driver = PipelineDriver::new(&Config::default(), centered(0.5));
        assert!(run(&mut driver, &good_image(), 200).is_empty());
        assert_eq!(driver.stability_state().consecutive_good_frames, 0);
    }

    #[test]
    fn poor_quality_blocks_capture_and_reports_issues() {
        let mut driver = PipelineDriver::new(&Config::default(), centered(0.9));
        let image = dark_image();
        let out = driver.process_frame(&frame(&image, 0));
        assert_eq!(out.status.severity, Severity::Warning);
        assert_eq!(out.status.text, "WARNING: TOO DARK (Increase Gain), OUT OF FOCUS");
        assert!(run(&mut driver, &image, 100).is_empty());
    }

    #[test]
    fn quality_is_evaluated_on_cadence_and_cached() {
        let mut driver = PipelineDriver::new(&Config::default(), centered(0.9));
        driver.process_frame(&frame(&good_image(), 0));
        assert!(driver.latest_quality().unwrap().acceptable);

        // Frames 1..4 are not evaluated; the good verdict persists.
        for seq in 1..5 {
            driver.process_frame(&frame(&dark_image(), seq));
            assert!(driver.latest_quality().unwrap().acceptable);
        }
        driver.process_frame(&frame(&dark_image(), 5));
        assert!(!driver.latest_quality().unwrap().acceptable);
    }

    #[test]
    fn disabled_detection_holds_counter_and_skips_overlay() {
        let mut driver = PipelineDriver::new(&Config::default(), centered(0.9));
        let image = good_image();
        run(&mut driver, &image, 10);
        assert_eq!(driver.stability_state().consecutive_good_frames, 10);

        assert!(!driver.toggle_detection());
        for seq in 10..50 {
            let out = driver.process_frame(&frame(&image, seq));
            assert!(out.capture.is_none());
            assert!(out.detection.is_none());
            assert!(out.annotated.label.is_none());
            assert_eq!(out.annotated.image, image);
            assert_eq!(out.stability.consecutive_good_frames, 0);
            assert_eq!(out.status.text, "Status: CALIBRATION OK");
        }
        // Quality keeps running while detection is off.
        assert_eq!(driver.frame_count(), 50);

        assert!(driver.toggle_detection());
        let out = driver.process_frame(&frame(&image, 50));
        assert_eq!(out.stability.consecutive_good_frames, 1);
    }

    #[test]
    fn detector_errors_count_as_no_target() {
        let mut driver = PipelineDriver::new(&Config::default(), Box::new(FailingDetector));
        let image = good_image();
        let out = driver.process_frame(&frame(&image, 0));
        assert!(out.detection.is_none());
        assert!(out.capture.is_none());
        assert_eq!(out.status.text, "Status: CALIBRATION OK");
        assert_eq!(*out.annotated.image.get_pixel(320, 240), COLOR_CENTER_MARKER);
    }

    #[test]
    fn persistence_failure_is_shown_once() {
        let mut driver = PipelineDriver::new(&Config::default(), centered(0.8));
        let image = good_image();
        assert_eq!(run(&mut driver, &image, 30), vec![30]);
        run_from(&mut driver, &image, 30, 5);
        let before = driver.stability_state();
        assert_eq!(before.consecutive_good_frames, 5);

        driver.report_persistence_failure("snapshot_1739871001.jpg", "disk full");
        assert_eq!(driver.stability_state(), before);

        let out = driver.process_frame(&frame(&image, 35));
        assert_eq!(out.status.severity, Severity::Error);
        assert_eq!(
            out.status.text,
            "SNAPSHOT FAILED: snapshot_1739871001.jpg (disk full)"
        );
        // The run keeps growing and the previous capture time still gates the cooldown.
        assert_eq!(out.stability.consecutive_good_frames, 6);
        assert_eq!(out.stability.last_capture_ms, before.last_capture_ms);

        let out = driver.process_frame(&frame(&image, 36));
        assert_eq!(out.status.severity, Severity::Ok);
        assert_eq!(out.status.text, "OPTIMAL VIEW (7/30)");
    }

    /// Reports one box reaching far outside the frame and one entirely outside.
    struct FarBoxDetector;

    impl ObjectDetector for FarBoxDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
            Ok(vec![
                Detection::new(BoundingBox::new(-3.0e9, -3.0e9, 100.0, 100.0), 0.9),
                Detection::new(BoundingBox::new(1.0e9, 1.0e9, 3.0e9, 3.0e9), 0.95),
            ])
        }
    }

    #[test]
    fn out_of_frame_boxes_are_clipped_not_fatal() {
        let mut driver = PipelineDriver::new(&Config::default(), Box::new(FarBoxDetector));
        let image = good_image();
        for seq in 0..40 {
            let out = driver.process_frame(&frame(&image, seq));
            let det = out.detection.expect("partly visible box is kept");
            assert_eq!(det.bbox, BoundingBox::new(0.0, 0.0, 100.0, 100.0));
            assert!(!out.placement.unwrap().is_standard_view);
            assert!(out.capture.is_none());
            assert_eq!(out.annotated.label.unwrap().anchor, (0, -10));
        }
    }

    #[test]
    fn initial_status_before_first_evaluation() {
        let config = Config::default();
        let driver = PipelineDriver::new(&config, centered(0.9));
        assert_eq!(
            driver.status(None, false, 0).text,
            "Status: INITIALIZING..."
        );
    }

    #[test]
    fn window_secs_scales_threshold_with_fps() {
        let mut config = Config::default();
        config.source.fps = 5.0;
        config.stability.window_secs = Some(2.0);
        let mut driver = PipelineDriver::new(&config, centered(0.9));
        assert_eq!(run(&mut driver, &good_image(), 12), vec![10]);
    }
}

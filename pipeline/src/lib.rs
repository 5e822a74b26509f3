//! Per-frame decision pipeline for guided standard-view acquisition.
//!
//! Each incoming frame is graded for acquisition quality, checked for a
//! well-placed target, and fed to a stability tracker that fires a single
//! capture once the standard-view predicate has held long enough.

pub mod annotate;
pub mod detection;
pub mod driver;
pub mod placement;
pub mod quality;
pub mod stability;

pub use annotate::{AnnotatedFrame, FrameAnnotator, OverlayLabel};
pub use detection::traits::{DetectionError, NullDetector, ObjectDetector};
pub use detection::{BoundingBox, Detection, DetectionInterpreter};
pub use driver::{FrameOutput, PipelineDriver, Severity, Status};
pub use placement::{PlacementEvaluator, PlacementVerdict};
pub use quality::{QualityAssessor, QualityVerdict};
pub use stability::{CaptureEvent, StabilityState, StabilityTracker};

use sono_guide_common::frame::Frame;
use tracing::{debug, info};

/// Snapshot of the tracker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StabilityState {
    pub consecutive_good_frames: u32,
    pub last_capture_ms: Option<i64>,
}

/// Result of feeding one frame's predicate to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityUpdate {
    /// Predicate held; the run is `n` frames long and below the threshold.
    Accumulating(u32),
    /// Predicate failed; the run restarts from zero.
    Reset,
    /// Threshold reached outside the cooldown: capture now.
    Triggered,
    /// Threshold reached inside the cooldown: no capture, run restarts.
    Suppressed,
}

/// A still capture requested by the tracker, handed to persistence once.
#[derive(Debug, Clone)]
pub struct CaptureEvent {
    pub frame: Frame,
    pub timestamp_ms: i64,
    pub file_name: String,
}

/// Debounces the per-frame standard-view predicate into capture triggers.
///
/// The run counter grows while the predicate holds and resets to zero when it
/// fails or when the threshold is reached. Reaching the threshold fires a
/// trigger unless the previous capture happened less than the cooldown ago,
/// in which case the trigger is dropped. Timestamps come from frames, so the
/// tracker never reads the clock.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    threshold: u32,
    cooldown_ms: i64,
    state: StabilityState,
}

impl StabilityTracker {
    pub fn new(threshold: u32, cooldown_ms: i64) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown_ms,
            state: StabilityState::default(),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn state(&self) -> StabilityState {
        self.state
    }

    pub fn update(&mut self, is_standard_view: bool, now_ms: i64) -> StabilityUpdate {
        if !is_standard_view {
            if self.state.consecutive_good_frames > 0 {
                debug!(
                    run = self.state.consecutive_good_frames,
                    "stability run broken"
                );
            }
            self.state.consecutive_good_frames = 0;
            return StabilityUpdate::Reset;
        }

        self.state.consecutive_good_frames += 1;
        let run = self.state.consecutive_good_frames;
        if run < self.threshold {
            debug!(run, threshold = self.threshold, "stable frame");
            return StabilityUpdate::Accumulating(run);
        }

        self.state.consecutive_good_frames = 0;
        if let Some(last) = self.state.last_capture_ms {
            let since_ms = now_ms - last;
            if since_ms < self.cooldown_ms {
                info!(
                    since_ms,
                    cooldown_ms = self.cooldown_ms,
                    "stability reached inside cooldown, trigger suppressed"
                );
                return StabilityUpdate::Suppressed;
            }
        }

        self.state.last_capture_ms = Some(now_ms);
        info!(run, ts = now_ms, "stability reached, capture triggered");
        StabilityUpdate::Triggered
    }

    /// Clear the run without recording a predicate result.
    pub fn hold(&mut self) {
        self.state.consecutive_good_frames = 0;
    }
}

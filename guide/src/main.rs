mod presenter;
mod source;
mod storage;

use presenter::{Command, ConsolePresenter, Presenter};
use sono_guide_common::config::{Config, DetectionConfig};
use sono_guide_pipeline::detection::blob::BlobDetector;
use sono_guide_pipeline::{NullDetector, ObjectDetector, PipelineDriver};
use source::VideoSource;
use std::path::PathBuf;
use std::time::Duration;
use storage::SnapshotStore;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "guide.toml";

#[derive(Debug, thiserror::Error)]
pub enum GuideError {
    #[error("unknown detection backend '{0}', expected 'blob' or 'none'")]
    UnknownBackend(String),
}

/// Result of one background snapshot write.
#[derive(Debug)]
struct PersistOutcome {
    file_name: String,
    result: Result<PathBuf, String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LoopStats {
    frames: u64,
    captures: u64,
    saved: u64,
    failed: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let explicit = std::env::args().nth(1).map(PathBuf::from);
    let config_path = explicit
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    // A missing default file means built-in defaults; a missing explicit file is fatal.
    let use_defaults = explicit.is_none() && !config_path.exists();
    let config = if use_defaults {
        Config::default()
    } else {
        match Config::load(&config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {e}", config_path.display());
                std::process::exit(1);
            }
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    if use_defaults {
        warn!(path = DEFAULT_CONFIG_PATH, "config file not found, using defaults");
    }

    info!(
        source = config.source.path,
        width = config.source.width,
        height = config.source.height,
        backend = config.detection.backend,
        threshold = config.stability.effective_threshold(config.source.fps),
        cooldown_secs = config.stability.cooldown_secs,
        output_dir = config.storage.output_dir.display().to_string(),
        "starting sono-guide"
    );

    let detector = match build_detector(&config.detection) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "failed to build detector");
            std::process::exit(1);
        }
    };

    let source = VideoSource::open(&config.source);
    let store = SnapshotStore::new(&config.storage);
    let driver = PipelineDriver::new(&config, detector);
    let mut presenter = ConsolePresenter::new(Some(presenter::spawn_stdin_reader()));
    let tick = Duration::from_millis(config.source.tick_ms.max(1));

    info!(
        live = source.is_live(),
        output_dir = store.output_dir().display().to_string(),
        "entering frame loop (type 'd' + Enter to toggle detection, 'q' to quit)"
    );
    let stats = run_frame_loop(source, driver, store, &mut presenter, tick, None).await;

    info!(
        frames = stats.frames,
        captures = stats.captures,
        saved = stats.saved,
        failed = stats.failed,
        last_status = presenter.last_status().map(|s| s.text.as_str()).unwrap_or(""),
        "sono-guide stopped"
    );
}

fn build_detector(config: &DetectionConfig) -> Result<Box<dyn ObjectDetector>, GuideError> {
    match config.backend.as_str() {
        "blob" => Ok(Box::new(BlobDetector::from_config(config))),
        "none" => Ok(Box::new(NullDetector)),
        other => Err(GuideError::UnknownBackend(other.to_string())),
    }
}

/// Drive the pipeline one frame per tick until interrupted, told to quit, or
/// `max_frames` frames have been processed.
///
/// Captures are written on the blocking pool; their outcomes are collected
/// at the start of each tick and every write still in flight is awaited
/// before returning.
async fn run_frame_loop(
    mut source: VideoSource,
    mut driver: PipelineDriver,
    store: SnapshotStore,
    presenter: &mut dyn Presenter,
    tick: Duration,
    max_frames: Option<u64>,
) -> LoopStats {
    let (tx, mut rx) = mpsc::unbounded_channel::<PersistOutcome>();
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut stats = LoopStats::default();

    'frames: loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("interrupt received, stopping frame loop");
                break;
            }
        }

        while let Ok(outcome) = rx.try_recv() {
            record_outcome(&mut driver, &mut stats, outcome);
        }

        while let Some(command) = presenter.poll_command() {
            match command {
                Command::ToggleDetection => {
                    driver.toggle_detection();
                }
                Command::Quit => {
                    info!("quit requested");
                    break 'frames;
                }
            }
        }

        let frame = source.get_frame();
        let output = driver.process_frame(&frame);
        presenter.present(&output);
        stats.frames += 1;

        if let Some(event) = output.capture {
            stats.captures += 1;
            let store = store.clone();
            let tx = tx.clone();
            tokio::task::spawn_blocking(move || {
                let result = store
                    .save(&event.frame, &event.file_name)
                    .map_err(|e| e.to_string());
                let _ = tx.send(PersistOutcome {
                    file_name: event.file_name,
                    result,
                });
            });
        }

        if max_frames.is_some_and(|max| stats.frames >= max) {
            break;
        }
    }

    drop(tx);
    while let Some(outcome) = rx.recv().await {
        record_outcome(&mut driver, &mut stats, outcome);
    }
    stats
}

fn record_outcome(driver: &mut PipelineDriver, stats: &mut LoopStats, outcome: PersistOutcome) {
    match outcome.result {
        Ok(path) => {
            stats.saved += 1;
            debug!(path = path.display().to_string(), "snapshot write confirmed");
        }
        Err(reason) => {
            stats.failed += 1;
            error!(file_name = outcome.file_name, reason, "snapshot write failed");
            driver.report_persistence_failure(&outcome.file_name, &reason);
        }
    }
}

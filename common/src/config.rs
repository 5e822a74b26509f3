use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Video file or directory of still frames. Empty means synthetic noise only.
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Nominal frame rate of the loop, used to convert `stability.window_secs`.
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Delay between loop ticks.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_brightness_low")]
    pub brightness_low: f64,
    #[serde(default = "default_noise_high")]
    pub noise_high: f64,
    #[serde(default = "default_focus_low")]
    pub focus_low: f64,
    /// Evaluate quality once every `eval_interval` frames.
    #[serde(default = "default_eval_interval")]
    pub eval_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_detection_enabled")]
    pub enabled: bool,
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default = "default_blob_threshold")]
    pub blob_threshold: u8,
    #[serde(default = "default_min_area_fraction")]
    pub min_area_fraction: f32,
    #[serde(default = "default_downsample")]
    pub downsample: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacementConfig {
    #[serde(default = "default_view_confidence")]
    pub view_confidence: f32,
    /// Half-width of the centered band as a fraction of the frame dimension.
    #[serde(default = "default_center_margin")]
    pub center_margin: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StabilityConfig {
    #[serde(default = "default_threshold_frames")]
    pub threshold_frames: u32,
    /// When set, overrides `threshold_frames` using `source.fps`.
    #[serde(default)]
    pub window_secs: Option<f64>,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default)]
    pub group_by_date: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            brightness_low: default_brightness_low(),
            noise_high: default_noise_high(),
            focus_low: default_focus_low(),
            eval_interval: default_eval_interval(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: default_detection_enabled(),
            backend: default_backend(),
            min_confidence: default_min_confidence(),
            blob_threshold: default_blob_threshold(),
            min_area_fraction: default_min_area_fraction(),
            downsample: default_downsample(),
        }
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            view_confidence: default_view_confidence(),
            center_margin: default_center_margin(),
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            threshold_frames: default_threshold_frames(),
            window_secs: None,
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            jpeg_quality: default_jpeg_quality(),
            group_by_date: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl StabilityConfig {
    /// Number of consecutive good frames required before a capture fires.
    ///
    /// A configured `window_secs` is converted with the loop frame rate so the
    /// stability window keeps its duration when the cadence changes.
    pub fn effective_threshold(&self, fps: f64) -> u32 {
        match self.window_secs {
            Some(secs) if secs > 0.0 && fps > 0.0 => (secs * fps).ceil().max(1.0) as u32,
            _ => self.threshold_frames,
        }
    }

    pub fn cooldown_ms(&self) -> i64 {
        (self.cooldown_secs * 1000.0).round() as i64
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config = Self::from_toml(&content)?;
        debug!(path = path.display().to_string(), "config loaded");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.width == 0 || self.source.height == 0 {
            return Err(ConfigError::Invalid("source.width/height must be non-zero".into()));
        }
        if self.quality.eval_interval == 0 {
            return Err(ConfigError::Invalid("quality.eval_interval must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.detection.min_confidence) {
            return Err(ConfigError::Invalid("detection.min_confidence must be in [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.placement.view_confidence) {
            return Err(ConfigError::Invalid("placement.view_confidence must be in [0, 1]".into()));
        }
        if !(0.0..=0.5).contains(&self.placement.center_margin) {
            return Err(ConfigError::Invalid("placement.center_margin must be in [0, 0.5]".into()));
        }
        if self.stability.effective_threshold(self.source.fps) == 0 {
            return Err(ConfigError::Invalid("stability threshold must be at least 1 frame".into()));
        }
        if self.stability.cooldown_secs < 0.0 {
            return Err(ConfigError::Invalid("stability.cooldown_secs must not be negative".into()));
        }
        if self.detection.downsample == 0 {
            return Err(ConfigError::Invalid("detection.downsample must be at least 1".into()));
        }
        if self.storage.jpeg_quality == 0 || self.storage.jpeg_quality > 100 {
            return Err(ConfigError::Invalid("storage.jpeg_quality must be in 1..=100".into()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> f64 {
    15.0
}
fn default_tick_ms() -> u64 {
    15
}
fn default_brightness_low() -> f64 {
    40.0
}
fn default_noise_high() -> f64 {
    80.0
}
fn default_focus_low() -> f64 {
    100.0
}
fn default_eval_interval() -> u64 {
    5
}
fn default_detection_enabled() -> bool {
    true
}
fn default_backend() -> String {
    "blob".into()
}
fn default_min_confidence() -> f32 {
    0.4
}
fn default_blob_threshold() -> u8 {
    128
}
fn default_min_area_fraction() -> f32 {
    0.01
}
fn default_downsample() -> u32 {
    4
}
fn default_view_confidence() -> f32 {
    0.6
}
fn default_center_margin() -> f32 {
    0.15
}
fn default_threshold_frames() -> u32 {
    30
}
fn default_cooldown_secs() -> f64 {
    3.0
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_file_prefix() -> String {
    "snapshot_".into()
}
fn default_jpeg_quality() -> u8 {
    90
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.source.width, 640);
        assert_eq!(config.source.height, 480);
        assert_eq!(config.quality.eval_interval, 5);
        assert_eq!(config.detection.min_confidence, 0.4);
        assert_eq!(config.placement.center_margin, 0.15);
        assert_eq!(config.stability.threshold_frames, 30);
        assert_eq!(config.stability.cooldown_ms(), 3000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [quality]
            focus_low = 50.0

            [stability]
            cooldown_secs = 1.5
            "#,
        )
        .unwrap();
        assert_eq!(config.quality.focus_low, 50.0);
        assert_eq!(config.quality.brightness_low, 40.0);
        assert_eq!(config.stability.cooldown_ms(), 1500);
        assert_eq!(config.stability.threshold_frames, 30);
    }

    #[test]
    fn window_secs_overrides_frame_count() {
        let stability = StabilityConfig {
            window_secs: Some(2.0),
            ..StabilityConfig::default()
        };
        assert_eq!(stability.effective_threshold(15.0), 30);
        assert_eq!(stability.effective_threshold(30.0), 60);
        assert_eq!(StabilityConfig::default().effective_threshold(60.0), 30);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = Config::from_toml("[placement]\ncenter_margin = 0.8").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = Config::from_toml("[quality]\neval_interval = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn parse_error_is_reported() {
        let err = Config::from_toml("[source\nwidth = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::load(Path::new("/nonexistent/guide.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile(..)));
    }

    #[test]
    fn sample_config_matches_defaults() {
        let config = Config::from_toml(include_str!("../../guide.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.source.path, defaults.source.path);
        assert_eq!(config.source.tick_ms, defaults.source.tick_ms);
        assert_eq!(config.detection.backend, defaults.detection.backend);
        assert_eq!(config.detection.blob_threshold, defaults.detection.blob_threshold);
        assert_eq!(config.stability.window_secs, None);
        assert_eq!(config.storage.output_dir, defaults.storage.output_dir);
        assert_eq!(config.storage.jpeg_quality, defaults.storage.jpeg_quality);
    }
}

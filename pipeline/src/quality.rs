use image::{GrayImage, RgbImage};
use sono_guide_common::config::QualityConfig;
use tracing::debug;

pub const ISSUE_TOO_DARK: &str = "TOO DARK (Increase Gain)";
pub const ISSUE_HIGH_NOISE: &str = "HIGH NOISE (Lower Gain)";
pub const ISSUE_OUT_OF_FOCUS: &str = "OUT OF FOCUS";

/// Result of one quality evaluation. Superseded by the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityVerdict {
    /// Mean luma intensity.
    pub brightness: f64,
    /// Standard deviation of luma intensity.
    pub noise_level: f64,
    /// Variance of the Laplacian response.
    pub focus_measure: f64,
    pub acceptable: bool,
    pub issues: Vec<String>,
}

/// Grades frames for brightness, noise and focus.
///
/// Brightness is the mean luma, noise is its standard deviation, and focus is
/// the variance of the 3x3 Laplacian response. Low focus means blur.
#[derive(Debug, Clone)]
pub struct QualityAssessor {
    brightness_low: f64,
    noise_high: f64,
    focus_low: f64,
}

impl QualityAssessor {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            brightness_low: config.brightness_low,
            noise_high: config.noise_high,
            focus_low: config.focus_low,
        }
    }

    pub fn evaluate(&self, image: &RgbImage) -> QualityVerdict {
        let gray = image::imageops::grayscale(image);
        let (brightness, noise_level) = luma_mean_std(&gray);
        let focus_measure = laplacian_variance(&gray);

        let mut issues = Vec::new();
        if brightness < self.brightness_low {
            issues.push(ISSUE_TOO_DARK.to_string());
        }
        if noise_level > self.noise_high {
            issues.push(ISSUE_HIGH_NOISE.to_string());
        }
        if focus_measure < self.focus_low {
            issues.push(ISSUE_OUT_OF_FOCUS.to_string());
        }

        debug!(
            brightness = format!("{:.1}", brightness),
            noise = format!("{:.1}", noise_level),
            focus = format!("{:.1}", focus_measure),
            issues = issues.len(),
            "quality evaluated"
        );

        QualityVerdict {
            brightness,
            noise_level,
            focus_measure,
            acceptable: issues.is_empty(),
            issues,
        }
    }
}

/// Mean and population standard deviation of the luma channel.
pub fn luma_mean_std(gray: &GrayImage) -> (f64, f64) {
    let n = gray.as_raw().len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let (sum, sum_sq) = gray.as_raw().iter().fold((0.0f64, 0.0f64), |(s, sq), &p| {
        let v = p as f64;
        (s + v, sq + v * v)
    });
    let mean = sum / n as f64;
    let variance = (sum_sq / n as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Variance of the Laplacian over the full image.
///
/// Kernel:
/// ```text
/// [ 0  1  0 ]
/// [ 1 -4  1 ]
/// [ 0  1  0 ]
/// ```
/// Border pixels are mirrored without repeating the edge (reflect-101).
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    let n = width as usize * height as usize;
    if n == 0 {
        return 0.0;
    }

    let (w, h) = (width as i64, height as i64);
    let px = |x: i64, y: i64| -> i64 {
        let xr = reflect101(x, w);
        let yr = reflect101(y, h);
        gray.get_pixel(xr, yr)[0] as i64
    };

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..h {
        for x in 0..w {
            let lap = px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4 * px(x, y);
            let v = lap as f64;
            sum += v;
            sum_sq += v * v;
        }
    }
    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0)
}

fn reflect101(i: i64, n: i64) -> u32 {
    if n == 1 {
        return 0;
    }
    let r = if i < 0 {
        -i
    } else if i >= n {
        2 * n - 2 - i
    } else {
        i
    };
    r.clamp(0, n - 1) as u32
}

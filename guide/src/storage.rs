use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use sono_guide_common::config::StorageConfig;
use sono_guide_common::frame::Frame;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to create directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("snapshot already exists: {0}")]
    Exists(String),
    #[error("failed to open {0}: {1}")]
    Open(String, std::io::Error),
    #[error("failed to encode {0}: {1}")]
    Encode(String, image::ImageError),
    #[error("failed to write {0}: {1}")]
    Write(String, std::io::Error),
}

/// Writes captured frames as JPEG files on the local filesystem.
///
/// Existing files are never overwritten.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    output_dir: PathBuf,
    jpeg_quality: u8,
    group_by_date: bool,
}

impl SnapshotStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
            group_by_date: config.group_by_date,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Target path for a snapshot, with the `YYYY-MM-DD/` level when grouping.
    pub fn path_for(&self, frame: &Frame, file_name: &str) -> PathBuf {
        if self.group_by_date {
            self.output_dir.join(frame.date_str()).join(file_name)
        } else {
            self.output_dir.join(file_name)
        }
    }

    pub fn save(&self, frame: &Frame, file_name: &str) -> Result<PathBuf, StorageError> {
        let path = self.path_for(frame, file_name);
        let path_display = path.display().to_string();

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| StorageError::CreateDir(dir.display().to_string(), e))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => StorageError::Exists(path_display.clone()),
                _ => StorageError::Open(path_display.clone(), e),
            })?;

        if let Err(e) = self.encode(frame, BufWriter::new(file), &path_display) {
            // Leave no truncated file behind.
            if let Err(rm) = std::fs::remove_file(&path) {
                debug!(error = %rm, path = path_display.as_str(), "failed to remove partial snapshot");
            }
            return Err(e);
        }

        info!(path = path_display.as_str(), seq = frame.seq, "snapshot saved");
        Ok(path)
    }

    fn encode<W: Write>(&self, frame: &Frame, mut writer: W, display: &str) -> Result<(), StorageError> {
        let (width, height) = frame.dimensions();
        JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)
            .encode(frame.image.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|e| StorageError::Encode(display.to_string(), e))?;
        writer
            .flush()
            .map_err(|e| StorageError::Write(display.to_string(), e))
    }
}

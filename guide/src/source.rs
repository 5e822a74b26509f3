use image::RgbImage;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sono_guide_common::config::SourceConfig;
use sono_guide_common::frame::Frame;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("video source unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("failed to decode frame {0}: {1}")]
    Decode(String, String),
}

/// A seekable stream of decoded frames.
pub trait VideoReader {
    /// Next frame, or `Ok(None)` at end of stream.
    fn read(&mut self) -> Result<Option<RgbImage>, SourceError>;

    /// Seek back to the first frame.
    fn rewind(&mut self) -> Result<(), SourceError>;

    fn describe(&self) -> String;
}

/// Directory of still images played back in file-name order.
pub struct ImageSequenceReader {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageSequenceReader {
    pub fn open(dir: &Path) -> Result<Self, SourceError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", dir.display())))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(SourceError::Unavailable(format!(
                "{}: no image files",
                dir.display()
            )));
        }

        info!(dir = dir.display().to_string(), frames = files.len(), "image sequence opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            next: 0,
        })
    }
}

impl VideoReader for ImageSequenceReader {
    fn read(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let img = image::open(path)
            .map_err(|e| SourceError::Decode(path.display().to_string(), e.to_string()))?;
        Ok(Some(img.to_rgb8()))
    }

    fn rewind(&mut self) -> Result<(), SourceError> {
        self.next = 0;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.dir.display())
    }
}

/// Video file decoded to raw RGB by an `ffmpeg` subprocess.
///
/// Frames are scaled to the configured size so every read is exactly
/// `width * height * 3` bytes. Rewinding restarts the subprocess, unless the
/// previous run decoded nothing.
pub struct FfmpegReader {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Child,
    stdout: ChildStdout,
    frames_decoded: u64,
}

impl FfmpegReader {
    pub fn open(path: &Path, width: u32, height: u32) -> Result<Self, SourceError> {
        if !path.is_file() {
            return Err(SourceError::Unavailable(format!(
                "{}: no such file",
                path.display()
            )));
        }
        Self::probe()?;
        let (child, stdout) = Self::spawn(path, width, height)?;
        info!(
            path = path.display().to_string(),
            width, height, "ffmpeg video source opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            child,
            stdout,
            frames_decoded: 0,
        })
    }

    /// Check that `ffmpeg` runs at all before relying on it for decoding.
    pub fn probe() -> Result<(), SourceError> {
        match Command::new("ffmpeg").arg("-version").output() {
            Ok(out) if out.status.success() => {
                debug!("ffmpeg is available");
                Ok(())
            }
            Ok(out) => {
                warn!(status = %out.status, "ffmpeg returned non-zero for -version");
                Err(SourceError::Unavailable("ffmpeg -version failed".into()))
            }
            Err(e) => {
                warn!(error = %e, "ffmpeg not found on PATH; install it to decode video files");
                Err(SourceError::Unavailable(format!("ffmpeg not found: {e}")))
            }
        }
    }

    fn spawn(path: &Path, width: u32, height: u32) -> Result<(Child, ChildStdout), SourceError> {
        let scale = format!("scale={width}:{height}");
        let mut child = Command::new("ffmpeg")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-vf", &scale, "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SourceError::Unavailable(format!("failed to spawn ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Unavailable("could not get ffmpeg stdout".into()))?;
        Ok((child, stdout))
    }

    fn stop(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!(error = %e, "ffmpeg already exited");
        }
        let _ = self.child.wait();
    }
}

impl VideoReader for FfmpegReader {
    fn read(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => {
                self.frames_decoded += 1;
                Ok(RgbImage::from_raw(self.width, self.height, buf))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(SourceError::Read(e.to_string())),
        }
    }

    fn rewind(&mut self) -> Result<(), SourceError> {
        self.stop();
        if self.frames_decoded == 0 {
            return Err(SourceError::Decode(
                self.path.display().to_string(),
                "ffmpeg produced no frames".into(),
            ));
        }
        self.frames_decoded = 0;
        let (child, stdout) = Self::spawn(&self.path, self.width, self.height)?;
        self.child = child;
        self.stdout = stdout;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("ffmpeg {}", self.path.display())
    }
}

impl Drop for FfmpegReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Frame source that never fails.
///
/// Reads from the underlying reader; at end of stream it rewinds and retries
/// once. A reader that cannot rewind, or yields nothing right after a rewind,
/// is dropped for good. Without a reader every frame is uniform random noise.
pub struct VideoSource {
    reader: Option<Box<dyn VideoReader>>,
    width: u32,
    height: u32,
    rng: StdRng,
    seq: u64,
}

impl VideoSource {
    /// Open the configured path: a directory is an image sequence, anything
    /// else a video file. Any failure falls back to synthetic frames.
    pub fn open(config: &SourceConfig) -> Self {
        if config.path.is_empty() {
            info!("no video source configured, using synthetic noise");
            return Self::synthetic(config.width, config.height);
        }

        let path = Path::new(&config.path);
        let opened: Result<Box<dyn VideoReader>, SourceError> = if path.is_dir() {
            ImageSequenceReader::open(path).map(|r| Box::new(r) as Box<dyn VideoReader>)
        } else {
            FfmpegReader::open(path, config.width, config.height)
                .map(|r| Box::new(r) as Box<dyn VideoReader>)
        };
        match opened {
            Ok(r) => Self::with_reader(Some(r), config.width, config.height),
            Err(e) => {
                warn!(error = %e, path = config.path, "falling back to synthetic noise");
                Self::synthetic(config.width, config.height)
            }
        }
    }

    pub fn with_reader(reader: Option<Box<dyn VideoReader>>, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
            rng: StdRng::from_entropy(),
            seq: 0,
        }
    }

    pub fn synthetic(width: u32, height: u32) -> Self {
        Self::with_reader(None, width, height)
    }

    pub fn is_live(&self) -> bool {
        self.reader.is_some()
    }

    pub fn get_frame(&mut self) -> Frame {
        let image = self.read_stream().unwrap_or_else(|| self.noise());
        let seq = self.seq;
        self.seq += 1;
        Frame::now(image, seq)
    }

    fn read_stream(&mut self) -> Option<RgbImage> {
        let reader = self.reader.as_mut()?;
        match reader.read() {
            Ok(Some(img)) => return Some(img),
            Ok(None) => debug!(source = reader.describe(), "end of stream, rewinding"),
            Err(e) => warn!(error = %e, source = reader.describe(), "frame read failed, rewinding"),
        }

        let retried = match reader.rewind() {
            Ok(()) => reader.read(),
            Err(e) => Err(e),
        };
        match retried {
            Ok(Some(img)) => return Some(img),
            Ok(None) => warn!(
                source = reader.describe(),
                "stream empty after rewind, switching to synthetic noise"
            ),
            Err(e) => warn!(
                error = %e,
                source = reader.describe(),
                "stream unusable after rewind, switching to synthetic noise"
            ),
        }
        self.reader = None;
        None
    }

    fn noise(&mut self) -> RgbImage {
        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        self.rng.fill_bytes(&mut buf);
        RgbImage::from_raw(self.width, self.height, buf)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

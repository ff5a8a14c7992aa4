//! Frame sources and sinks.
//!
//! The pipeline only sees the [`FrameSource`] / [`FrameSink`] traits. Backends:
//! in-memory frames, directories of numbered images, and (with the `ffmpeg`
//! feature) real video containers.

#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod image_seq;
mod sampling;

use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::{Deserialize, Serialize};

#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg::{FfmpegSink, FfmpegSource};
pub use image_seq::{ImageSequenceSink, ImageSequenceSource};
pub use sampling::{count_frames, pick_sample_indices, read_sample_frames, SampledFrames};

/// Stream properties reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Frames per second as reported; may be zero or non-finite.
    pub fps: f64,
    /// `None` when the container does not report a count.
    pub frame_count: Option<usize>,
}

// ── Errors ─────────────────────────────────────────────────────────────────

/// Frame I/O failure.
#[derive(Debug)]
pub enum VideoError {
    Io(std::io::Error),
    Image(image::ImageError),
    /// Decoder/encoder backend failure.
    Backend(String),
    /// A frame does not match the stream resolution.
    FrameSize {
        expected: (u32, u32),
        got: (u32, u32),
    },
    /// A directory without any readable frames.
    Empty(PathBuf),
    /// The path needs a backend this build does not include.
    Unsupported(String),
}

impl std::fmt::Display for VideoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Image(e) => write!(f, "image error: {e}"),
            Self::Backend(msg) => write!(f, "video backend error: {msg}"),
            Self::FrameSize { expected, got } => write!(
                f,
                "frame size {}x{} does not match stream size {}x{}",
                got.0, got.1, expected.0, expected.1
            ),
            Self::Empty(path) => write!(f, "no frames found in {}", path.display()),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
        }
    }
}

impl std::error::Error for VideoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VideoError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<image::ImageError> for VideoError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e)
    }
}

// ── Traits ─────────────────────────────────────────────────────────────────

/// Sequential frame reader with optional random access.
pub trait FrameSource {
    fn info(&self) -> VideoInfo;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError>;

    /// Position the stream so that the next read returns frame `index`.
    ///
    /// Returns `Ok(false)` when the source cannot seek.
    fn seek(&mut self, _index: usize) -> Result<bool, VideoError> {
        Ok(false)
    }

    /// Restart from the first frame.
    fn rewind(&mut self) -> Result<(), VideoError>;
}

/// Ordered frame writer.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), VideoError>;

    /// Flush and close. Called once after the last frame.
    fn finish(&mut self) -> Result<(), VideoError>;
}

fn check_size(expected: (u32, u32), frame: &RgbImage) -> Result<(), VideoError> {
    let got = frame.dimensions();
    if got != expected {
        return Err(VideoError::FrameSize { expected, got });
    }
    Ok(())
}

// ── In-memory backend ──────────────────────────────────────────────────────

/// Frames held in memory.
#[derive(Debug, Clone)]
pub struct MemoryVideo {
    frames: Vec<RgbImage>,
    fps: f64,
    pos: usize,
    seekable: bool,
    report_count: bool,
}

impl MemoryVideo {
    /// All frames must share one size.
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        Self {
            frames,
            fps,
            pos: 0,
            seekable: true,
            report_count: true,
        }
    }

    /// Refuse seeking, like a stream without an index.
    pub fn non_seekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    /// Do not report the frame count, like a container without one.
    pub fn without_frame_count(mut self) -> Self {
        self.report_count = false;
        self
    }
}

impl FrameSource for MemoryVideo {
    fn info(&self) -> VideoInfo {
        let (width, height) = self.frames.first().map_or((0, 0), |f| f.dimensions());
        VideoInfo {
            width,
            height,
            fps: self.fps,
            frame_count: self.report_count.then_some(self.frames.len()),
        }
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        let frame = self.frames.get(self.pos).cloned();
        if frame.is_some() {
            self.pos += 1;
        }
        Ok(frame)
    }

    fn seek(&mut self, index: usize) -> Result<bool, VideoError> {
        if !self.seekable {
            return Ok(false);
        }
        self.pos = index;
        Ok(true)
    }

    fn rewind(&mut self) -> Result<(), VideoError> {
        self.pos = 0;
        Ok(())
    }
}

/// Collects written frames in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    frames: Vec<RgbImage>,
    finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[RgbImage] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<RgbImage> {
        self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), VideoError> {
        if let Some(first) = self.frames.first() {
            check_size(first.dimensions(), frame)?;
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        self.finished = true;
        Ok(())
    }
}

// ── Path dispatch ──────────────────────────────────────────────────────────

/// Whether `path` names an image-sequence directory rather than a container.
pub fn is_sequence_path(path: &Path) -> bool {
    path.is_dir() || path.extension().is_none()
}

/// Open a frame source for `path`.
///
/// Directories are read as image sequences at `fps`; files need the
/// `ffmpeg` feature.
pub fn open_source(path: &Path, fps: f64) -> Result<Box<dyn FrameSource>, VideoError> {
    if path.is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(path, fps)?));
    }
    if !path.exists() {
        return Err(VideoError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("input {} does not exist", path.display()),
        )));
    }
    open_file_source(path)
}

#[cfg(feature = "ffmpeg")]
fn open_file_source(path: &Path) -> Result<Box<dyn FrameSource>, VideoError> {
    Ok(Box::new(FfmpegSource::open(path)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_file_source(path: &Path) -> Result<Box<dyn FrameSource>, VideoError> {
    Err(VideoError::Unsupported(format!(
        "reading video file {} requires the `ffmpeg` feature",
        path.display()
    )))
}

/// Create a frame sink for `path`.
///
/// Directories (or paths without an extension) receive numbered PNG files;
/// other paths are encoded with `codec` and need the `ffmpeg` feature.
pub fn create_sink(
    path: &Path,
    info: &VideoInfo,
    codec: &str,
) -> Result<Box<dyn FrameSink>, VideoError> {
    if is_sequence_path(path) {
        return Ok(Box::new(ImageSequenceSink::create(path, info)?));
    }
    create_file_sink(path, info, codec)
}

#[cfg(feature = "ffmpeg")]
fn create_file_sink(
    path: &Path,
    info: &VideoInfo,
    codec: &str,
) -> Result<Box<dyn FrameSink>, VideoError> {
    Ok(Box::new(FfmpegSink::create(path, info, codec)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn create_file_sink(
    path: &Path,
    _info: &VideoInfo,
    _codec: &str,
) -> Result<Box<dyn FrameSink>, VideoError> {
    Err(VideoError::Unsupported(format!(
        "writing video file {} requires the `ffmpeg` feature",
        path.display()
    )))
}

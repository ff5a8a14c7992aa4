//! Directories of numbered image files as video streams.

use std::path::{Path, PathBuf};

use image::RgbImage;

use super::{check_size, FrameSink, FrameSource, VideoError, VideoInfo};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

fn is_frame_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Reads `*.png` / `*.jpg` files of a directory in file-name order.
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    info: VideoInfo,
    pos: usize,
}

impl ImageSequenceSource {
    /// Index the directory and read the first frame for the resolution.
    pub fn open(dir: &Path, fps: f64) -> Result<Self, VideoError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if is_frame_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        let first = paths
            .first()
            .ok_or_else(|| VideoError::Empty(dir.to_path_buf()))?;
        let (width, height) = image::image_dimensions(first)?;
        tracing::info!(
            "image sequence {}: {} frames, {}x{}",
            dir.display(),
            paths.len(),
            width,
            height
        );
        Ok(Self {
            info: VideoInfo {
                width,
                height,
                fps,
                frame_count: Some(paths.len()),
            },
            paths,
            pos: 0,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        let Some(path) = self.paths.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        let frame = image::open(path)?.to_rgb8();
        check_size((self.info.width, self.info.height), &frame)?;
        Ok(Some(frame))
    }

    fn seek(&mut self, index: usize) -> Result<bool, VideoError> {
        self.pos = index;
        Ok(true)
    }

    fn rewind(&mut self) -> Result<(), VideoError> {
        self.pos = 0;
        Ok(())
    }
}

/// Writes `frame_000000.png`, `frame_000001.png`, … into a directory.
#[derive(Debug, Clone)]
pub struct ImageSequenceSink {
    dir: PathBuf,
    size: (u32, u32),
    next_index: usize,
}

impl ImageSequenceSink {
    pub fn create(dir: &Path, info: &VideoInfo) -> Result<Self, VideoError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            size: (info.width, info.height),
            next_index: 0,
        })
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }

    pub fn frames_written(&self) -> usize {
        self.next_index
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), VideoError> {
        check_size(self.size, frame)?;
        frame.save(self.frame_path(self.next_index))?;
        self.next_index += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        tracing::debug!(
            "wrote {} frames to {}",
            self.next_index,
            self.dir.display()
        );
        Ok(())
    }
}

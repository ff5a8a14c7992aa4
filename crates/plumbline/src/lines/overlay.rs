//! Diagnostic overlays of detected segments.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use super::LineSegment;

const SEGMENT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Copy of `frame` with every segment drawn in green.
pub fn draw_segments(frame: &RgbImage, segments: &[LineSegment]) -> RgbImage {
    let mut out = frame.clone();
    for s in segments {
        draw_line_segment_mut(
            &mut out,
            (s.x1 as f32, s.y1 as f32),
            (s.x2 as f32, s.y2 as f32),
            SEGMENT_COLOR,
        );
    }
    out
}

/// File name used for the overlay of sampled frame `index`.
pub fn overlay_file_name(index: usize) -> String {
    format!("segments_frame_{index:06}.png")
}

/// Draw segments onto `frame` and save the result into `dir`.
///
/// The directory is created if needed. Returns the written path.
pub fn write_overlay(
    dir: &Path,
    index: usize,
    frame: &RgbImage,
    segments: &[LineSegment],
) -> Result<PathBuf, image::ImageError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(overlay_file_name(index));
    draw_segments(frame, segments).save(&path)?;
    Ok(path)
}

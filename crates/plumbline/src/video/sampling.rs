//! Choosing and reading the frames used for calibration.

use image::RgbImage;

use super::{FrameSource, VideoError};
use crate::self_undistort::linspace;

/// Pick `k` frame indices spread over `[⌊n·m⌋, max(start+1, ⌊n·(1−m)⌋))`.
///
/// The margin skips the first and last fraction of the video. When `k`
/// covers the whole window every index is returned; otherwise `k` evenly
/// spaced indices from `start` to `end − 1`, truncated to integers.
pub fn pick_sample_indices(n_frames: usize, k: usize, margin_ratio: f64) -> Vec<usize> {
    if n_frames == 0 || k == 0 {
        return Vec::new();
    }
    let m = if margin_ratio.is_finite() {
        margin_ratio.clamp(0.0, 0.5)
    } else {
        0.0
    };
    let n = n_frames as f64;
    let mut start = (n * m) as usize;
    let mut end = ((n * (1.0 - m)) as usize).max(start + 1);
    if end > n_frames || end <= start {
        start = 0;
        end = n_frames;
    }
    if k >= end - start {
        return (start..end).collect();
    }
    linspace(start as f64, (end - 1) as f64, k)
        .into_iter()
        .map(|v| v as usize)
        .collect()
}

/// Count the frames of `source` by decoding it once from the start.
///
/// Used for containers that report no frame count. Frames that fail to
/// decode still count; the pass gives up after a run of consecutive
/// failures. The source is left rewound.
pub fn count_frames(source: &mut dyn FrameSource) -> Result<usize, VideoError> {
    const MAX_CONSECUTIVE_ERRORS: usize = 16;

    source.rewind()?;
    let mut count = 0usize;
    let mut failures = 0usize;
    loop {
        match source.next_frame() {
            Ok(Some(_)) => {
                count += 1;
                failures = 0;
            }
            Ok(None) => break,
            Err(e) => {
                failures += 1;
                if failures >= MAX_CONSECUTIVE_ERRORS {
                    return Err(e);
                }
                count += 1;
            }
        }
    }
    source.rewind()?;
    Ok(count)
}

/// Frames read for calibration.
#[derive(Debug, Default)]
pub struct SampledFrames {
    /// `(index, frame)` in increasing index order.
    pub frames: Vec<(usize, RgbImage)>,
    /// Requested indices that could not be read.
    pub skipped: usize,
    /// Whether seeking was used.
    pub seeked: bool,
}

/// Read the frames at `indices` (ascending).
///
/// Seeks when the source reports a frame count and accepts the seek;
/// otherwise rewinds and reads sequentially, keeping the selected ordinals.
/// Unreadable frames are skipped and counted, not fatal.
pub fn read_sample_frames(
    source: &mut dyn FrameSource,
    indices: &[usize],
) -> Result<SampledFrames, VideoError> {
    let mut out = SampledFrames::default();
    let Some(&first) = indices.first() else {
        return Ok(out);
    };

    if source.info().frame_count.is_some() && source.seek(first)? {
        out.seeked = true;
        for &idx in indices {
            let frame = match source.seek(idx) {
                Ok(true) => source.next_frame(),
                Ok(false) => Ok(None),
                Err(e) => Err(e),
            };
            match frame {
                Ok(Some(f)) => out.frames.push((idx, f)),
                Ok(None) => {
                    tracing::warn!("sample frame {} is past the end of the stream", idx);
                    out.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("failed to read sample frame {}: {}", idx, e);
                    out.skipped += 1;
                }
            }
        }
        return Ok(out);
    }

    source.rewind()?;
    let mut wanted = indices.iter().copied().peekable();
    let mut ordinal = 0usize;
    while let Some(&next) = wanted.peek() {
        match source.next_frame() {
            Ok(Some(frame)) => {
                if ordinal == next {
                    out.frames.push((ordinal, frame));
                    wanted.next();
                    // duplicate indices select the same frame once
                    while wanted.peek() == Some(&ordinal) {
                        wanted.next();
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                if ordinal == next {
                    tracing::warn!("failed to read sample frame {}: {}", ordinal, e);
                    out.skipped += 1;
                    wanted.next();
                }
            }
        }
        ordinal += 1;
    }
    let remaining = wanted.count();
    if remaining > 0 {
        tracing::warn!(
            "stream ended after {} frames; {} sample frames missing",
            ordinal,
            remaining
        );
        out.skipped += remaining;
    }
    Ok(out)
}

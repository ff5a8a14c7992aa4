use image::GrayImage;
use nalgebra::Matrix2;

use crate::lines::{LineDetector, LineSegment};
use crate::pixelmap::{remap_image, BorderMode, DivisionModel, Interpolation, RemapTable};

use super::config::LineLengthConfig;

/// Cost assigned to candidates that map any sample point out of the valid
/// domain of the model.
pub(super) const INVALID_COST: f64 = 1e50;

/// A segment resampled once, before the search.
#[derive(Debug, Clone)]
pub(super) struct SampledSegment {
    pub points: Vec<[f64; 2]>,
    pub length: f64,
}

pub(super) fn sample_segments(segments: &[LineSegment], n: usize) -> Vec<SampledSegment> {
    segments
        .iter()
        .map(|s| SampledSegment {
            points: s.resample(n),
            length: s.length(),
        })
        .filter(|s| s.points.len() >= 2)
        .collect()
}

/// Sum of squared orthogonal distances of `points` to their
/// total-least-squares line.
///
/// Equals the smaller eigenvalue of the centered scatter matrix.
pub(super) fn tls_residual_sse(points: &[[f64; 2]]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let my = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let mut s = Matrix2::<f64>::zeros();
    for p in points {
        let (dx, dy) = (p[0] - mx, p[1] - my);
        s[(0, 0)] += dx * dx;
        s[(0, 1)] += dx * dy;
        s[(1, 1)] += dy * dy;
    }
    s[(1, 0)] = s[(0, 1)];
    let eig = s.symmetric_eigen();
    eig.eigenvalues[0].min(eig.eigenvalues[1]).max(0.0)
}

/// Straightness cost of `segments` after undistortion with `model`.
///
/// Lower is better. Returns [`INVALID_COST`] when any sample point is
/// invalid under the model.
pub(super) fn straightness_cost(
    model: &DivisionModel,
    segments: &[SampledSegment],
    length_weight: f64,
) -> f64 {
    let mut total = 0.0;
    for seg in segments {
        let Some(undistorted) = model.undistort_points(&seg.points) else {
            return INVALID_COST;
        };
        total += tls_residual_sse(&undistorted) * (1.0 + length_weight * seg.length);
    }
    if total.is_finite() {
        total
    } else {
        INVALID_COST
    }
}

/// Total length of Hough lines found in one frame.
pub(super) fn frame_line_length(gray: &GrayImage, cfg: &LineLengthConfig) -> f64 {
    let (w, h) = gray.dimensions();
    let min_dim = w.min(h) as f64;
    let min_len = (cfg.min_line_frac * min_dim).floor().max(10.0);
    let max_gap = (cfg.max_gap_frac * min_dim).floor().max(2.0);
    let detector = LineDetector::Hough(crate::lines::HoughConfig {
        min_line_length: min_len,
        max_line_gap: max_gap,
        ..cfg.hough.clone()
    });

    let filtered = imageproc::filter::median_filter(gray, 1, 1);
    detector
        .detect(&filtered, min_len)
        .iter()
        .map(LineSegment::length)
        .sum()
}

/// Line-length score of `frames` remapped with `model`; higher is better.
pub(super) fn line_length_score(
    model: &DivisionModel,
    frames: &[GrayImage],
    cfg: &LineLengthConfig,
) -> f64 {
    let mut total = 0.0;
    for frame in frames {
        let (w, h) = frame.dimensions();
        let table = RemapTable::from_model(model, w, h, 1.0);
        let remapped = remap_image(frame, &table, Interpolation::Bilinear, BorderMode::Replicate);
        total += frame_line_length(&remapped, cfg);
    }
    total - cfg.regularization * model.lambda * model.lambda
}

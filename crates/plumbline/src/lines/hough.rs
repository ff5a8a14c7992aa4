//! Canny edges + progressive probabilistic Hough transform.

use std::f64::consts::PI;

use image::GrayImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{EdgePoint, LineSegment};

/// Hysteresis thresholds for the Canny stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CannyThresholds {
    /// Absolute thresholds.
    Fixed { low: f32, high: f32 },
    /// Thresholds relative to the median intensity of the frame.
    Auto { low_ratio: f32, high_ratio: f32 },
}

impl Default for CannyThresholds {
    fn default() -> Self {
        Self::Fixed {
            low: 50.0,
            high: 150.0,
        }
    }
}

impl CannyThresholds {
    /// Median-based thresholds (`0.66·median`, `1.33·median`).
    pub fn auto() -> Self {
        Self::Auto {
            low_ratio: 0.66,
            high_ratio: 1.33,
        }
    }

    /// Concrete `(low, high)` for a frame.
    pub fn resolve(&self, gray: &GrayImage) -> (f32, f32) {
        match *self {
            Self::Fixed { low, high } => (low, high.max(low)),
            Self::Auto {
                low_ratio,
                high_ratio,
            } => {
                let median = median_intensity(gray) as f32;
                let low = (low_ratio * median).clamp(0.0, 255.0);
                let high = (high_ratio * median).clamp(0.0, 255.0);
                (low, high.max(low))
            }
        }
    }
}

fn median_intensity(gray: &GrayImage) -> u8 {
    let mut hist = [0usize; 256];
    for p in gray.as_raw() {
        hist[*p as usize] += 1;
    }
    let half = gray.as_raw().len().div_ceil(2);
    let mut seen = 0;
    for (v, count) in hist.iter().enumerate() {
        seen += count;
        if seen >= half && seen > 0 {
            return v as u8;
        }
    }
    0
}

/// Settings for the Canny + Hough detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoughConfig {
    /// Canny hysteresis thresholds.
    pub canny: CannyThresholds,
    /// Distance resolution of the accumulator (pixels).
    pub rho: f64,
    /// Angle resolution of the accumulator (degrees).
    pub theta_deg: f64,
    /// Accumulator votes needed before a line is traced.
    pub threshold: u32,
    /// Minimum traced length (pixels). `0` uses the extractor's length.
    pub min_line_length: f64,
    /// Largest run of missing edge pixels bridged while tracing.
    pub max_line_gap: f64,
    /// Perpendicular half-width (pixels) around the traced line in which
    /// edge pixels continue the trace and join the support. Lets a slightly
    /// curved edge keep its shape in the support; `0` traces the exact line.
    pub support_band: u32,
    /// Seed for the edge-point visiting order.
    pub seed: u64,
}

impl Default for HoughConfig {
    fn default() -> Self {
        Self {
            canny: CannyThresholds::default(),
            rho: 1.0,
            theta_deg: 1.0,
            threshold: 60,
            min_line_length: 0.0,
            max_line_gap: 10.0,
            support_band: 2,
            seed: 0xFFFF_FFFF,
        }
    }
}

struct Accumulator {
    num_rho: usize,
    cos_t: Vec<f64>,
    sin_t: Vec<f64>,
    votes: Vec<i32>,
}

impl Accumulator {
    fn new(width: usize, height: usize, rho: f64, theta: f64) -> Self {
        let num_angle = ((PI / theta).round() as usize).max(1);
        let num_rho = ((((width + height) * 2 + 1) as f64 / rho).round() as usize).max(1);
        let (cos_t, sin_t) = (0..num_angle)
            .map(|n| {
                let a = n as f64 * theta;
                (a.cos() / rho, a.sin() / rho)
            })
            .unzip();
        Self {
            num_rho,
            cos_t,
            sin_t,
            votes: vec![0; num_angle * num_rho],
        }
    }

    fn bin(&self, n: usize, x: usize, y: usize) -> usize {
        let r = (x as f64 * self.cos_t[n] + y as f64 * self.sin_t[n]).round() as i64
            + ((self.num_rho - 1) / 2) as i64;
        n * self.num_rho + r.clamp(0, self.num_rho as i64 - 1) as usize
    }

    /// Add the votes of one point; returns `(best_angle, best_votes)`.
    fn vote(&mut self, x: usize, y: usize) -> (usize, i32) {
        let mut best = (0, i32::MIN);
        for n in 0..self.cos_t.len() {
            let b = self.bin(n, x, y);
            self.votes[b] += 1;
            if self.votes[b] > best.1 {
                best = (n, self.votes[b]);
            }
        }
        best
    }

    fn unvote(&mut self, x: usize, y: usize) {
        for n in 0..self.cos_t.len() {
            let b = self.bin(n, x, y);
            self.votes[b] -= 1;
        }
    }
}

fn pixel_at(p: [f64; 2], w: usize, h: usize) -> Option<(usize, usize)> {
    let x = p[0].round();
    let y = p[1].round();
    if x < 0.0 || y < 0.0 || x >= w as f64 || y >= h as f64 {
        None
    } else {
        Some((x as usize, y as usize))
    }
}

/// Pixels across the line at `p`: the walk pixel first, then offsets
/// `±1..=band` along `normal`.
fn band_pixels(
    p: [f64; 2],
    normal: [f64; 2],
    band: i32,
    w: usize,
    h: usize,
) -> impl Iterator<Item = (usize, usize)> {
    (0..=2 * band).filter_map(move |j| {
        // 0, 1, -1, 2, -2, ...
        let k = f64::from(if j % 2 == 1 { (j + 1) / 2 } else { -(j / 2) });
        pixel_at([p[0] + k * normal[0], p[1] + k * normal[1]], w, h)
    })
}

pub(super) fn detect(
    gray: &GrayImage,
    cfg: &HoughConfig,
    min_length_hint: f64,
) -> Vec<LineSegment> {
    let (low, high) = cfg.canny.resolve(gray);
    let edges = imageproc::edges::canny(gray, low, high);
    detect_on_edges(&edges, cfg, min_length_hint)
}

/// Probabilistic Hough on a binary edge map (non-zero = edge).
pub(super) fn detect_on_edges(
    edges: &GrayImage,
    cfg: &HoughConfig,
    min_length_hint: f64,
) -> Vec<LineSegment> {
    let (w, h) = (edges.width() as usize, edges.height() as usize);
    let rho = if cfg.rho > 0.0 { cfg.rho } else { 1.0 };
    let theta = if cfg.theta_deg > 0.0 {
        cfg.theta_deg.to_radians()
    } else {
        PI / 180.0
    };
    let min_len = if cfg.min_line_length > 0.0 {
        cfg.min_line_length
    } else {
        min_length_hint.max(0.0)
    };
    let threshold = cfg.threshold.max(1) as i32;
    let band = cfg.support_band.min(8) as i32;

    let mut mask: Vec<bool> = edges.as_raw().iter().map(|&v| v > 0).collect();
    let mut voted = vec![false; w * h];
    let mut points: Vec<(usize, usize)> = (0..w * h)
        .filter(|&i| mask[i])
        .map(|i| (i % w, i / w))
        .collect();
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    points.shuffle(&mut rng);

    let mut acc = Accumulator::new(w, h, rho, theta);
    let mut segments = Vec::new();

    for (x, y) in points {
        if !mask[y * w + x] {
            continue;
        }
        let (best_n, best_votes) = acc.vote(x, y);
        voted[y * w + x] = true;
        if best_votes < threshold {
            continue;
        }

        // walk along the level line in both directions from (x, y)
        let a = -acc.sin_t[best_n];
        let b = acc.cos_t[best_n];
        let norm = a.abs().max(b.abs());
        let step = [a / norm, b / norm];
        let normal = [acc.cos_t[best_n], acc.sin_t[best_n]];
        let start = [x as f64, y as f64];
        let hit = |p: [f64; 2], mask: &[bool]| {
            band_pixels(p, normal, band, w, h).any(|(px, py)| mask[py * w + px])
        };

        let mut ends = [(x, y); 2];
        for (k, end) in ends.iter_mut().enumerate() {
            let sign = if k == 0 { 1.0 } else { -1.0 };
            let mut p = start;
            let mut gap = 0.0;
            while let Some(walk_px) = pixel_at(p, w, h) {
                if hit(p, &mask) {
                    gap = 0.0;
                    *end = walk_px;
                } else {
                    gap += 1.0;
                    if gap > cfg.max_line_gap {
                        break;
                    }
                }
                p = [p[0] + sign * step[0], p[1] + sign * step[1]];
            }
        }

        let length =
            (ends[0].0 as f64 - ends[1].0 as f64).hypot(ends[0].1 as f64 - ends[1].1 as f64);
        let good_line = length >= min_len;

        // rejected traces only release the walk pixels
        let across = if good_line { band } else { 0 };
        let mut support = Vec::new();
        for (k, end) in ends.iter().enumerate() {
            let sign = if k == 0 { 1.0 } else { -1.0 };
            let mut p = start;
            while let Some(walk_px) = pixel_at(p, w, h) {
                for (px, py) in band_pixels(p, normal, across, w, h) {
                    let i = py * w + px;
                    if !mask[i] {
                        continue;
                    }
                    if good_line {
                        if voted[i] {
                            acc.unvote(px, py);
                            voted[i] = false;
                        }
                        support.push(EdgePoint {
                            xy: [px as f64, py as f64],
                            weight: 1.0,
                        });
                    }
                    mask[i] = false;
                }
                if walk_px == *end {
                    break;
                }
                p = [p[0] + sign * step[0], p[1] + sign * step[1]];
            }
        }

        if good_line {
            let (p1, p2) = (ends[1], ends[0]);
            segments.push(
                LineSegment::new(p1.0 as f64, p1.1 as f64, p2.0 as f64, p2.1 as f64)
                    .with_support(support),
            );
        }
    }
    segments
}

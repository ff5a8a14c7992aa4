//! Line evidence extraction.
//!
//! Detects long straight edge segments in grayscale frames. Under lens
//! distortion these "straight" segments are slightly curved; the pixels each
//! detector grouped into a segment are kept as [`LineSegment::support`] so the
//! estimator can measure that curvature.

mod hough;
mod lsd;
mod overlay;

use image::GrayImage;
use serde::{Deserialize, Serialize};

pub use hough::{CannyThresholds, HoughConfig};
pub use lsd::LsdConfig;
pub use overlay::{draw_segments, overlay_file_name, write_overlay};

/// One edge pixel grouped into a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgePoint {
    /// Pixel position.
    pub xy: [f64; 2],
    /// Non-negative weight (gradient magnitude or 1).
    pub weight: f64,
}

/// Detected line segment in pixel coordinates of the frame it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    /// Edge pixels supporting the segment. Empty means "chord only".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub support: Vec<EdgePoint>,
}

impl LineSegment {
    /// Segment without support pixels.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            support: Vec::new(),
        }
    }

    /// Attach support pixels.
    pub fn with_support(mut self, support: Vec<EdgePoint>) -> Self {
        self.support = support;
        self
    }

    pub fn p1(&self) -> [f64; 2] {
        [self.x1, self.y1]
    }

    pub fn p2(&self) -> [f64; 2] {
        [self.x2, self.y2]
    }

    /// Euclidean endpoint distance.
    pub fn length(&self) -> f64 {
        (self.x2 - self.x1).hypot(self.y2 - self.y1)
    }

    /// Scale endpoints and support by `s` (resolution change).
    pub fn scaled(&self, s: f64) -> Self {
        Self {
            x1: self.x1 * s,
            y1: self.y1 * s,
            x2: self.x2 * s,
            y2: self.y2 * s,
            support: self
                .support
                .iter()
                .map(|p| EdgePoint {
                    xy: [p.xy[0] * s, p.xy[1] * s],
                    weight: p.weight,
                })
                .collect(),
        }
    }

    /// `n` points along the segment, ordered from `p1` to `p2`.
    ///
    /// With support, the support pixels are binned along the segment axis
    /// and each non-empty bin yields its weighted centroid, so the points
    /// follow the observed edge trace. Without usable support the points
    /// are evenly spaced on the chord.
    pub fn resample(&self, n: usize) -> Vec<[f64; 2]> {
        if n == 0 {
            return Vec::new();
        }
        if let Some(trace) = self.support_trace(n) {
            return trace;
        }
        self.chord_points(n)
    }

    fn chord_points(&self, n: usize) -> Vec<[f64; 2]> {
        if n == 1 {
            return vec![self.p1()];
        }
        let denom = (n - 1) as f64;
        (0..n)
            .map(|i| {
                let t = i as f64 / denom;
                [
                    self.x1 + t * (self.x2 - self.x1),
                    self.y1 + t * (self.y2 - self.y1),
                ]
            })
            .collect()
    }

    fn support_trace(&self, n: usize) -> Option<Vec<[f64; 2]>> {
        let len = self.length();
        if self.support.len() < 2 || len < 1e-9 {
            return None;
        }
        let ux = (self.x2 - self.x1) / len;
        let uy = (self.y2 - self.y1) / len;

        // per bin: (sum w·x, sum w·y, sum w)
        let mut bins = vec![[0.0f64; 3]; n];
        for p in &self.support {
            if !p.weight.is_finite() || p.weight <= 0.0 {
                continue;
            }
            let t = ((p.xy[0] - self.x1) * ux + (p.xy[1] - self.y1) * uy) / len;
            let b = ((t * n as f64).floor().max(0.0) as usize).min(n - 1);
            bins[b][0] += p.weight * p.xy[0];
            bins[b][1] += p.weight * p.xy[1];
            bins[b][2] += p.weight;
        }

        let trace: Vec<[f64; 2]> = bins
            .iter()
            .filter(|b| b[2] > 0.0)
            .map(|b| [b[0] / b[2], b[1] / b[2]])
            .collect();
        if trace.len() < 2 {
            None
        } else {
            Some(trace)
        }
    }
}

/// Reference length for the minimum-length filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceLength {
    /// Image diagonal.
    #[default]
    Diagonal,
    /// `min(width, height)`.
    MinDimension,
}

impl ReferenceLength {
    pub fn length(self, width: u32, height: u32) -> f64 {
        let (w, h) = (width as f64, height as f64);
        match self {
            Self::Diagonal => w.hypot(h),
            Self::MinDimension => w.min(h),
        }
    }
}

/// Line detector strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineDetector {
    /// Gradient region growing with rectangle fit.
    Lsd(LsdConfig),
    /// Canny edges followed by a progressive probabilistic Hough transform.
    Hough(HoughConfig),
}

impl Default for LineDetector {
    fn default() -> Self {
        Self::Lsd(LsdConfig::default())
    }
}

impl LineDetector {
    /// Run the detector. `min_length` (pixels) is a hint; the caller still
    /// filters by length.
    pub fn detect(&self, gray: &GrayImage, min_length: f64) -> Vec<LineSegment> {
        match self {
            Self::Lsd(cfg) => lsd::detect(gray, cfg),
            Self::Hough(cfg) => hough::detect(gray, cfg, min_length),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lsd(_) => "lsd",
            Self::Hough(_) => "hough",
        }
    }
}

/// Detection and filtering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Detector strategy.
    pub detector: LineDetector,
    /// Drop segments shorter than this fraction of the reference length.
    pub min_length_frac: f64,
    /// What `min_length_frac` is relative to.
    pub reference: ReferenceLength,
    /// Keep at most this many (longest) segments per frame.
    pub max_per_frame: usize,
    /// Global cap across all sampled frames.
    pub max_total: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            detector: LineDetector::default(),
            min_length_frac: 0.05,
            reference: ReferenceLength::Diagonal,
            max_per_frame: 200,
            max_total: 1400,
        }
    }
}

impl ExtractConfig {
    /// Minimum accepted segment length in pixels for a frame size.
    pub fn min_length_px(&self, width: u32, height: u32) -> f64 {
        self.min_length_frac * self.reference.length(width, height)
    }
}

fn sort_longest_first(segments: &mut [LineSegment]) {
    segments.sort_by(|a, b| b.length().total_cmp(&a.length()));
}

/// Detect, length-filter and cap the segments of one grayscale frame.
///
/// Returns the segments longest first. An empty result is not an error.
pub fn extract_segments(gray: &GrayImage, config: &ExtractConfig) -> Vec<LineSegment> {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return Vec::new();
    }
    let min_len = config.min_length_px(w, h);
    let mut segments: Vec<LineSegment> = config
        .detector
        .detect(gray, min_len)
        .into_iter()
        .filter(|s| s.length() >= min_len)
        .collect();
    sort_longest_first(&mut segments);
    segments.truncate(config.max_per_frame);
    tracing::debug!(
        "{}: {} segments (min length {:.1}px)",
        config.detector.name(),
        segments.len(),
        min_len
    );
    segments
}

/// Collects per-frame segments up to a global cap.
#[derive(Debug, Clone)]
pub struct SegmentAccumulator {
    max_total: usize,
    segments: Vec<LineSegment>,
    frames: usize,
}

impl SegmentAccumulator {
    pub fn new(max_total: usize) -> Self {
        Self {
            max_total,
            segments: Vec::new(),
            frames: 0,
        }
    }

    /// Add one frame's segments. Returns `false` (and ignores the input)
    /// once the cap has been reached.
    pub fn push(&mut self, frame_segments: Vec<LineSegment>) -> bool {
        if self.is_full() {
            return false;
        }
        self.frames += 1;
        self.segments.extend(frame_segments);
        true
    }

    pub fn is_full(&self) -> bool {
        self.segments.len() >= self.max_total
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Frames accepted so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Longest-first segments, truncated to the cap.
    pub fn finish(self) -> Vec<LineSegment> {
        let mut segments = self.segments;
        sort_longest_first(&mut segments);
        segments.truncate(self.max_total);
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{blur_gray, draw_half_plane};
    use approx::assert_abs_diff_eq;

    fn seg(len: f64) -> LineSegment {
        LineSegment::new(0.0, 0.0, len, 0.0)
    }

    #[test]
    fn chord_resample_is_evenly_spaced() {
        let s = LineSegment::new(0.0, 0.0, 10.0, 20.0);
        let pts = s.resample(5);
        assert_eq!(pts.len(), 5);
        assert_eq!(pts[0], [0.0, 0.0]);
        assert_eq!(pts[4], [10.0, 20.0]);
        assert_abs_diff_eq!(pts[2][0], 5.0);
        assert_abs_diff_eq!(pts[2][1], 10.0);
    }

    #[test]
    fn support_resample_follows_the_trace() {
        // a shallow arc y = 0.01 (x - 50)^2 sampled as support
        let support: Vec<EdgePoint> = (0..=100)
            .map(|x| {
                let x = x as f64;
                EdgePoint {
                    xy: [x, 0.01 * (x - 50.0).powi(2)],
                    weight: 1.0,
                }
            })
            .collect();
        let s = LineSegment::new(0.0, 25.0, 100.0, 25.0).with_support(support);
        let pts = s.resample(10);
        assert_eq!(pts.len(), 10);
        // middle bins sit near the bottom of the arc, not on the chord
        assert!(pts[4][1] < 5.0);
        assert!(pts[0][1] > 15.0);
        assert!(pts.windows(2).all(|w| w[0][0] < w[1][0]));
    }

    #[test]
    fn zero_weight_support_falls_back_to_chord() {
        let support = vec![
            EdgePoint {
                xy: [1.0, 5.0],
                weight: 0.0,
            };
            4
        ];
        let s = LineSegment::new(0.0, 0.0, 4.0, 0.0).with_support(support);
        assert_eq!(s.resample(3), vec![[0.0, 0.0], [2.0, 0.0], [4.0, 0.0]]);
    }

    #[test]
    fn accumulator_caps_and_sorts() {
        let mut acc = SegmentAccumulator::new(3);
        assert!(acc.push(vec![seg(5.0), seg(1.0)]));
        assert!(acc.push(vec![seg(9.0), seg(2.0)]));
        assert!(acc.is_full());
        assert!(!acc.push(vec![seg(100.0)]));
        assert_eq!(acc.frames(), 2);
        let out = acc.finish();
        let lens: Vec<f64> = out.iter().map(|s| s.length()).collect();
        assert_eq!(lens, vec![9.0, 5.0, 2.0]);
    }

    #[test]
    fn min_length_uses_reference() {
        let cfg = ExtractConfig::default();
        assert_abs_diff_eq!(cfg.min_length_px(300, 400), 25.0);
        let cfg = ExtractConfig {
            reference: ReferenceLength::MinDimension,
            ..ExtractConfig::default()
        };
        assert_abs_diff_eq!(cfg.min_length_px(300, 400), 15.0);
    }

    #[test]
    fn blank_frame_yields_no_segments() {
        let gray = GrayImage::from_pixel(64, 48, image::Luma([90]));
        assert!(extract_segments(&gray, &ExtractConfig::default()).is_empty());
        let hough = ExtractConfig {
            detector: LineDetector::Hough(HoughConfig::default()),
            ..ExtractConfig::default()
        };
        assert!(extract_segments(&gray, &hough).is_empty());
    }

    #[test]
    fn both_detectors_find_a_horizontal_edge() {
        let gray = blur_gray(&draw_half_plane(200, 120, 60.3, 40, 200), 1.0);
        for detector in [
            LineDetector::Lsd(LsdConfig::default()),
            LineDetector::Hough(HoughConfig::default()),
        ] {
            let cfg = ExtractConfig {
                detector: detector.clone(),
                ..ExtractConfig::default()
            };
            let segs = extract_segments(&gray, &cfg);
            assert!(!segs.is_empty(), "{} found nothing", detector.name());
            let best = &segs[0];
            assert!(best.length() > 150.0, "{}: {:?}", detector.name(), best);
            let ymid = 0.5 * (best.y1 + best.y2);
            assert!((ymid - 60.3).abs() < 1.5, "{}: y={}", detector.name(), ymid);
        }
    }

    #[test]
    fn extractor_caps_per_frame() {
        let gray = blur_gray(&draw_half_plane(200, 120, 60.3, 40, 200), 1.0);
        let cfg = ExtractConfig {
            max_per_frame: 1,
            min_length_frac: 0.0,
            ..ExtractConfig::default()
        };
        assert_eq!(extract_segments(&gray, &cfg).len(), 1);
    }

    #[test]
    fn detector_config_roundtrips_through_json() {
        let cfg = ExtractConfig {
            detector: LineDetector::Hough(HoughConfig::default()),
            ..ExtractConfig::default()
        };
        let json = serde_json::to_string(&cfg).expect("serialize");
        assert!(json.contains("\"kind\":\"hough\""));
        let back: ExtractConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, cfg);
    }
}

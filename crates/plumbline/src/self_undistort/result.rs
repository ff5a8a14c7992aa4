use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::lines::LineSegment;
use crate::pixelmap::DivisionModel;

use super::config::ObjectiveKind;

/// Line evidence gathered from the sampled frames.
///
/// All coordinates are in the estimation resolution. `frames` is only
/// consulted by the line-length objective.
#[derive(Debug, Clone, Default)]
pub struct LineEvidence {
    pub segments: Vec<LineSegment>,
    pub frames: Vec<GrayImage>,
    /// Frames that contributed evidence.
    pub n_frames: usize,
}

impl LineEvidence {
    pub fn from_segments(segments: Vec<LineSegment>, n_frames: usize) -> Self {
        Self {
            segments,
            frames: Vec::new(),
            n_frames,
        }
    }
}

/// Result of self-undistort estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfUndistortResult {
    /// Estimated division model in the estimation resolution.
    pub model: DivisionModel,
    /// Objective used.
    pub objective: ObjectiveKind,
    /// Cost at the estimate (lower is better; line-length scores are negated).
    pub cost: f64,
    /// Cost at lambda=0 and the chosen center (baseline).
    pub cost_at_zero: f64,
    /// Segments used.
    pub n_segments: usize,
    /// Frames the evidence came from.
    pub n_frames: usize,
    /// Evidence was below the configured minimum.
    pub low_evidence: bool,
}

impl SelfUndistortResult {
    /// Relative cost reduction against the λ = 0 baseline.
    pub fn improvement(&self) -> f64 {
        if self.cost_at_zero.abs() > f64::EPSILON {
            (self.cost_at_zero - self.cost) / self.cost_at_zero.abs()
        } else {
            0.0
        }
    }
}

/// Why estimation could not produce a model.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimateError {
    /// No usable evidence for the selected objective.
    InsufficientEvidence { segments: usize, frames: usize },
    /// Unusable search settings.
    InvalidRange(String),
}

impl std::fmt::Display for EstimateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientEvidence { segments, frames } => write!(
                f,
                "insufficient line evidence ({segments} segments from {frames} frames)"
            ),
            Self::InvalidRange(reason) => write!(f, "invalid search settings: {reason}"),
        }
    }
}

impl std::error::Error for EstimateError {}

use serde::{Deserialize, Serialize};

use crate::lines::{CannyThresholds, HoughConfig};
use crate::pixelmap::NormalizationRadius;

/// Which quantity the λ search optimizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Total-least-squares residual of undistorted segment traces (minimized).
    #[default]
    Straightness,
    /// Total Hough line length in remapped frames (maximized).
    LineLength,
}

/// Multi-start search over the principal point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenterSearchConfig {
    /// Search a grid of principal points instead of using the image center.
    pub enable: bool,
    /// Half-extent of the grid as a fraction of width (x) and height (y).
    pub frac: f64,
    /// Grid points per axis.
    pub steps: usize,
}

impl Default for CenterSearchConfig {
    fn default() -> Self {
        Self {
            enable: false,
            frac: 0.03,
            steps: 3,
        }
    }
}

/// Settings of the line-length objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineLengthConfig {
    /// Hough detector run on each remapped frame. Its length and gap
    /// fields are overridden from the fractions below.
    pub hough: HoughConfig,
    /// Minimum line length as a fraction of `min(width, height)`.
    pub min_line_frac: f64,
    /// Maximum bridged gap as a fraction of `min(width, height)`.
    pub max_gap_frac: f64,
    /// Penalty `regularization · λ²` subtracted from the score.
    pub regularization: f64,
}

impl Default for LineLengthConfig {
    fn default() -> Self {
        Self {
            hough: HoughConfig {
                canny: CannyThresholds::auto(),
                threshold: 50,
                support_band: 0,
                ..HoughConfig::default()
            },
            min_line_frac: 0.05,
            max_gap_frac: 0.01,
            regularization: 0.0,
        }
    }
}

/// Configuration for self-undistort estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfUndistortConfig {
    /// Objective to optimize.
    pub objective: ObjectiveKind,
    /// Search range for lambda: [lambda_min, lambda_max].
    #[serde(alias = "lambda_bounds")]
    pub lambda_range: [f64; 2],
    /// How `scale_norm` is derived from the estimation resolution.
    pub normalization: NormalizationRadius,
    /// Points per λ grid pass.
    pub grid_points: usize,
    /// Total number of grid passes, the coarse one included.
    pub refine_iters: usize,
    /// Stop refining once the bracket is narrower than this.
    pub tolerance: f64,
    /// Points each segment is resampled to (straightness objective).
    pub samples_per_segment: usize,
    /// Per-segment weight `1 + length_weight · length` (straightness objective).
    pub length_weight: f64,
    /// Fewer segments than this marks the estimate as low-evidence.
    pub min_segments: usize,
    /// Principal-point refinement.
    #[serde(alias = "pp_refine")]
    pub center_search: CenterSearchConfig,
    /// Line-length objective settings.
    pub line_length: LineLengthConfig,
}

impl Default for SelfUndistortConfig {
    fn default() -> Self {
        Self {
            objective: ObjectiveKind::Straightness,
            lambda_range: [-0.8, 0.8],
            normalization: NormalizationRadius::MaxDimension,
            grid_points: 41,
            refine_iters: 3,
            tolerance: 1e-5,
            samples_per_segment: 25,
            length_weight: 0.001,
            min_segments: 10,
            center_search: CenterSearchConfig::default(),
            line_length: LineLengthConfig::default(),
        }
    }
}

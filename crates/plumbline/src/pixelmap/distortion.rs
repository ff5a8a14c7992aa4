use super::PixelMapper;
use serde::{Deserialize, Serialize};

/// Denominators at or below this value make the forward mapping undefined.
const MIN_DENOM: f64 = 1e-9;
/// Below this |lambda| the model is treated as the identity.
const LAMBDA_EPS: f64 = 1e-12;
/// Below this normalized r² the inverse factor is taken as 1.
const R2_EPS: f64 = 1e-12;

/// How the normalization radius `scale_norm` is derived from a resolution.
///
/// Lambda is defined on normalized radii, so the same rule must be used
/// wherever a model is moved between resolutions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationRadius {
    /// `max(width, height)`.
    #[default]
    MaxDimension,
    /// Half of the image diagonal.
    HalfDiagonal,
}

impl NormalizationRadius {
    /// Normalization radius in pixels for an image of the given size.
    pub fn radius(self, width: u32, height: u32) -> f64 {
        let w = width as f64;
        let h = height as f64;
        match self {
            Self::MaxDimension => w.max(h),
            Self::HalfDiagonal => 0.5 * w.hypot(h),
        }
    }
}

/// Single-parameter division distortion model.
///
/// A distorted pixel `p_d` maps to the undistorted pixel
///
/// ```text
/// p_u = c + (p_d - c) / (1 + λ r²),   r² = |p_d - c|² / s²
/// ```
///
/// where `c = (cx, cy)` is the principal point and `s = scale_norm`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DivisionModel {
    /// Distortion parameter on normalized radii.
    pub lambda: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
    /// Normalization radius (pixels), strictly positive.
    pub scale_norm: f64,
}

impl DivisionModel {
    /// Create a division model with explicit parameters.
    pub fn new(lambda: f64, cx: f64, cy: f64, scale_norm: f64) -> Self {
        Self {
            lambda,
            cx,
            cy,
            scale_norm,
        }
    }

    /// Create a division model centered on the image.
    pub fn centered(lambda: f64, width: u32, height: u32, norm: NormalizationRadius) -> Self {
        Self {
            lambda,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
            scale_norm: norm.radius(width, height),
        }
    }

    /// Identity model (zero distortion) centered on the image.
    pub fn identity(width: u32, height: u32) -> Self {
        Self::centered(0.0, width, height, NormalizationRadius::default())
    }

    /// Same model with another distortion parameter.
    pub fn with_lambda(self, lambda: f64) -> Self {
        Self { lambda, ..self }
    }

    /// Same model with another principal point.
    pub fn with_center(self, cx: f64, cy: f64) -> Self {
        Self { cx, cy, ..self }
    }

    /// All parameters finite and `scale_norm > 0`.
    pub fn is_valid(&self) -> bool {
        self.lambda.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.scale_norm.is_finite()
            && self.scale_norm > 0.0
    }

    fn normalized_offset(&self, p: [f64; 2]) -> [f64; 2] {
        [
            (p[0] - self.cx) / self.scale_norm,
            (p[1] - self.cy) / self.scale_norm,
        ]
    }

    /// Undistort a single point.
    ///
    /// Returns `None` where the model denominator is not positive.
    pub fn undistort_point(&self, distorted_xy: [f64; 2]) -> Option<[f64; 2]> {
        if self.lambda.abs() < LAMBDA_EPS {
            return Some(distorted_xy);
        }
        let [x, y] = self.normalized_offset(distorted_xy);
        let denom = 1.0 + self.lambda * (x * x + y * y);
        if !denom.is_finite() || denom <= MIN_DENOM {
            return None;
        }
        Some([
            self.cx + (distorted_xy[0] - self.cx) / denom,
            self.cy + (distorted_xy[1] - self.cy) / denom,
        ])
    }

    /// Undistort a batch of points; `None` if any point is invalid.
    pub fn undistort_points(&self, points: &[[f64; 2]]) -> Option<Vec<[f64; 2]>> {
        points.iter().map(|p| self.undistort_point(*p)).collect()
    }

    /// Closed-form radial factor `α` with `p_d = c + α (p_u - c)`.
    ///
    /// `None` when the discriminant `1 - 4 λ r_u²` is negative.
    fn inverse_factor(&self, r2_u: f64) -> Option<f64> {
        if self.lambda.abs() < LAMBDA_EPS || r2_u < R2_EPS {
            return Some(1.0);
        }
        let disc = 1.0 - 4.0 * self.lambda * r2_u;
        if disc < 0.0 {
            return None;
        }
        Some((1.0 - disc.sqrt()) / (2.0 * self.lambda * r2_u))
    }

    /// Distort a point (undistorted → distorted), or `None` where the
    /// inverse does not exist.
    pub fn distort_point_checked(&self, undistorted_xy: [f64; 2]) -> Option<[f64; 2]> {
        let [x, y] = self.normalized_offset(undistorted_xy);
        let alpha = self.inverse_factor(x * x + y * y)?;
        if alpha == 1.0 {
            return Some(undistorted_xy);
        }
        Some([
            self.cx + alpha * (undistorted_xy[0] - self.cx),
            self.cy + alpha * (undistorted_xy[1] - self.cy),
        ])
    }

    /// Distort a point (undistorted → distorted).
    ///
    /// Points with a negative discriminant are clamped to the identity
    /// mapping. This is lossy: such points do not round-trip.
    pub fn distort_point(&self, undistorted_xy: [f64; 2]) -> [f64; 2] {
        self.distort_point_checked(undistorted_xy)
            .unwrap_or(undistorted_xy)
    }
}

impl PixelMapper for DivisionModel {
    fn undistort_pixel(&self, distorted_xy: [f64; 2]) -> Option<[f64; 2]> {
        self.undistort_point(distorted_xy)
    }

    fn distort_pixel(&self, undistorted_xy: [f64; 2]) -> Option<[f64; 2]> {
        self.distort_point_checked(undistorted_xy)
    }
}

//! Self-undistort: plumb-line estimation of the division model.
//!
//! Straight scene lines image as curves under radial distortion. The
//! estimator searches the division parameter λ (and optionally the principal
//! point) that makes the detected line evidence straight again:
//!
//!   x_u = cx + (x_d - cx) / (1 + λ r²)
//!   y_u = cy + (y_d - cy) / (1 + λ r²)
//!
//! where r² = ((x_d - cx)² + (y_d - cy)²) / scale_norm².

mod config;
mod estimator;
mod objective;
mod optimizer;
mod result;

pub use config::{CenterSearchConfig, LineLengthConfig, ObjectiveKind, SelfUndistortConfig};
pub use estimator::estimate_self_undistort;
pub use optimizer::coarse_to_fine_search;
pub use result::{EstimateError, LineEvidence, SelfUndistortResult};

pub(crate) use optimizer::linspace;

#[cfg(test)]
mod tests;

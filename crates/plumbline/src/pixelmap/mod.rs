//! Pixel mapping between distorted (source) and undistorted (output) frames.

mod distortion;
mod remap;

pub use distortion::{DivisionModel, NormalizationRadius};
pub use remap::{build_remap, remap_image, BorderMode, Interpolation, RemapTable};

/// Mapping between distorted image pixels and undistorted pixels.
///
/// Both methods must be approximate inverses of each other. Return `None`
/// when a point cannot be mapped (it falls outside the valid domain of the
/// distortion model).
///
/// # Example
///
/// ```
/// use plumbline::PixelMapper;
///
/// struct Identity;
///
/// impl PixelMapper for Identity {
///     fn undistort_pixel(&self, p: [f64; 2]) -> Option<[f64; 2]> {
///         Some(p)
///     }
///     fn distort_pixel(&self, p: [f64; 2]) -> Option<[f64; 2]> {
///         Some(p)
///     }
/// }
/// ```
pub trait PixelMapper {
    /// Map a distorted (as recorded) pixel to undistorted coordinates.
    fn undistort_pixel(&self, distorted_xy: [f64; 2]) -> Option<[f64; 2]>;
    /// Map an undistorted pixel back to distorted (source) coordinates.
    fn distort_pixel(&self, undistorted_xy: [f64; 2]) -> Option<[f64; 2]>;
}

//! Shared synthetic renderers for image-based unit tests.

use image::{GrayImage, Luma};

use crate::pixelmap::DivisionModel;

/// Anti-aliased horizontal half-plane: `above` for `y < edge_y`, `below`
/// otherwise. Pixel `(x, y)` covers `[y - 0.5, y + 0.5]`.
pub(crate) fn draw_half_plane(w: u32, h: u32, edge_y: f64, above: u8, below: u8) -> GrayImage {
    GrayImage::from_fn(w, h, |_, y| {
        let top = y as f64 - 0.5;
        let frac_below = (top + 1.0 - edge_y.max(top)).clamp(0.0, 1.0);
        let v = above as f64 * (1.0 - frac_below) + below as f64 * frac_below;
        Luma([v.round() as u8])
    })
}

/// Render what a camera with distortion `model` records when viewing a scene
/// that is `above` for undistorted `y < edge_y_u` and `below` otherwise.
///
/// Each output pixel is supersampled `ss × ss` times; every sub-sample is
/// undistorted with the model and classified against the straight edge.
pub(crate) fn render_distorted_edge(
    w: u32,
    h: u32,
    model: &DivisionModel,
    edge_y_u: f64,
    above: u8,
    below: u8,
    ss: u32,
) -> GrayImage {
    let ss = ss.max(1);
    let n = (ss * ss) as f64;
    GrayImage::from_fn(w, h, |x, y| {
        let mut n_below = 0u32;
        for j in 0..ss {
            for i in 0..ss {
                let px = x as f64 - 0.5 + (i as f64 + 0.5) / ss as f64;
                let py = y as f64 - 0.5 + (j as f64 + 0.5) / ss as f64;
                let yu = model.undistort_point([px, py]).map_or(py, |p| p[1]);
                if yu >= edge_y_u {
                    n_below += 1;
                }
            }
        }
        let frac = n_below as f64 / n;
        Luma([(above as f64 * (1.0 - frac) + below as f64 * frac).round() as u8])
    })
}

/// Gaussian-blur a `GrayImage` via `imageproc`.
pub(crate) fn blur_gray(img: &GrayImage, sigma: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let f = image::ImageBuffer::<Luma<f32>, Vec<f32>>::from_fn(w, h, |x, y| {
        Luma([img.get_pixel(x, y)[0] as f32 / 255.0])
    });
    let blurred = imageproc::filter::gaussian_blur_f32(&f, sigma);
    GrayImage::from_fn(w, h, |x, y| {
        let v = blurred.get_pixel(x, y)[0].clamp(0.0, 1.0);
        Luma([(v * 255.0).round() as u8])
    })
}

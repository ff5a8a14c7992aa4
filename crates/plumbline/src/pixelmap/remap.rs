//! Remap tables and image resampling.
//!
//! A [`RemapTable`] stores, for every output (undistorted) pixel, the source
//! (distorted) location to sample. Tables are built once per resolution and
//! reused for every frame of a pass.

use image::{ImageBuffer, Pixel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{DivisionModel, PixelMapper};

/// Interpolation used when sampling the source frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    /// Keys cubic convolution (a = -0.5).
    Bicubic,
}

/// Policy for output pixels that sample outside the source frame.
///
/// This is visible at frame borders whenever the correction pulls pixels in
/// from outside the recorded field of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderMode {
    /// Fill every channel with a constant value.
    Constant(u8),
    /// Repeat the nearest edge pixel.
    Replicate,
}

impl Default for BorderMode {
    fn default() -> Self {
        Self::Constant(0)
    }
}

/// Per-output-pixel source coordinates.
#[derive(Debug, Clone)]
pub struct RemapTable {
    width: u32,
    height: u32,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
    clamped: usize,
}

impl RemapTable {
    /// Build a table for a division model.
    ///
    /// `zoom` rescales the output sampling grid about the principal point
    /// before inversion (`> 1` crops, `< 1` widens the field of view).
    pub fn from_model(model: &DivisionModel, width: u32, height: u32, zoom: f64) -> Self {
        Self::from_mapper(model, [model.cx, model.cy], width, height, zoom)
    }

    /// Build a table from any mapper.
    ///
    /// Output pixels the mapper cannot invert are clamped to the identity
    /// mapping and counted in [`RemapTable::clamped`].
    pub fn from_mapper<M>(mapper: &M, center: [f64; 2], width: u32, height: u32, zoom: f64) -> Self
    where
        M: PixelMapper + Sync + ?Sized,
    {
        let zoom = effective_zoom(zoom);
        let w = width as usize;
        let n = w * height as usize;
        let mut map_x = vec![0.0f32; n];
        let mut map_y = vec![0.0f32; n];

        let clamped: usize = if w == 0 {
            0
        } else {
            map_x
                .par_chunks_mut(w)
                .zip(map_y.par_chunks_mut(w))
                .enumerate()
                .map(|(row, (xs, ys))| {
                    let v = row as f64;
                    let mut row_clamped = 0usize;
                    for (col, (mx, my)) in xs.iter_mut().zip(ys.iter_mut()).enumerate() {
                        let u = col as f64;
                        let p = if zoom == 1.0 {
                            [u, v]
                        } else {
                            [
                                (u - center[0]) / zoom + center[0],
                                (v - center[1]) / zoom + center[1],
                            ]
                        };
                        let src = match mapper.distort_pixel(p) {
                            Some(d) => d,
                            None => {
                                row_clamped += 1;
                                p
                            }
                        };
                        *mx = src[0] as f32;
                        *my = src[1] as f32;
                    }
                    row_clamped
                })
                .sum()
        };

        if clamped > 0 {
            tracing::debug!(
                "remap table {}x{}: {} pixels clamped to identity",
                width,
                height,
                clamped
            );
        }

        Self {
            width,
            height,
            map_x,
            map_y,
            clamped,
        }
    }

    /// Output width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Output height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Output `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Row-major source x coordinates.
    pub fn map_x(&self) -> &[f32] {
        &self.map_x
    }

    /// Row-major source y coordinates.
    pub fn map_y(&self) -> &[f32] {
        &self.map_y
    }

    /// Source location sampled for output pixel `(x, y)`.
    pub fn source_xy(&self, x: u32, y: u32) -> Option<[f32; 2]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = y as usize * self.width as usize + x as usize;
        Some([self.map_x[i], self.map_y[i]])
    }

    /// Number of entries clamped to the identity mapping.
    pub fn clamped(&self) -> usize {
        self.clamped
    }
}

fn effective_zoom(zoom: f64) -> f64 {
    if zoom.is_finite() && zoom > 0.0 {
        zoom
    } else {
        tracing::warn!("invalid zoom {}; using 1.0", zoom);
        1.0
    }
}

/// Build a remap table from raw calibration values.
pub fn build_remap(
    width: u32,
    height: u32,
    cx: f64,
    cy: f64,
    scale_norm: f64,
    lambda: f64,
    zoom: f64,
) -> RemapTable {
    let model = DivisionModel::new(lambda, cx, cy, scale_norm);
    RemapTable::from_model(&model, width, height, zoom)
}

/// Resample `src` through `table`.
///
/// The output has the table's dimensions. Works for any 8-bit pixel type
/// (RGB frames, grayscale working images).
pub fn remap_image<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    table: &RemapTable,
    interpolation: Interpolation,
    border: BorderMode,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    let (out_w, out_h) = table.dimensions();
    let mut out = ImageBuffer::<P, Vec<u8>>::new(out_w, out_h);
    if out_w == 0 || out_h == 0 {
        return out;
    }

    let sampler = Sampler {
        data: src.as_raw(),
        width: src.width() as i64,
        height: src.height() as i64,
        channels: P::CHANNEL_COUNT as usize,
        border,
    };
    let row_len = out_w as usize * sampler.channels;

    let buf: &mut [u8] = &mut out;
    buf.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(row, dst_row)| {
            let base = row * out_w as usize;
            for (col, dst) in dst_row.chunks_mut(sampler.channels).enumerate() {
                let sx = table.map_x[base + col];
                let sy = table.map_y[base + col];
                match interpolation {
                    Interpolation::Nearest => sampler.nearest(sx, sy, dst),
                    Interpolation::Bilinear => sampler.bilinear(sx, sy, dst),
                    Interpolation::Bicubic => sampler.bicubic(sx, sy, dst),
                }
            }
        });

    out
}

struct Sampler<'a> {
    data: &'a [u8],
    width: i64,
    height: i64,
    channels: usize,
    border: BorderMode,
}

impl Sampler<'_> {
    fn fetch(&self, x: i64, y: i64, c: usize) -> f32 {
        let (x, y) = if x < 0 || y < 0 || x >= self.width || y >= self.height {
            match self.border {
                BorderMode::Constant(v) => return v as f32,
                BorderMode::Replicate => {
                    (x.clamp(0, self.width - 1), y.clamp(0, self.height - 1))
                }
            }
        } else {
            (x, y)
        };
        let i = (y as usize * self.width as usize + x as usize) * self.channels + c;
        self.data[i] as f32
    }

    fn fill_border(&self, dst: &mut [u8]) {
        let v = match self.border {
            BorderMode::Constant(v) => v,
            BorderMode::Replicate => 0,
        };
        dst.iter_mut().for_each(|d| *d = v);
    }

    fn usable(&self, x: f32, y: f32) -> bool {
        self.width > 0 && self.height > 0 && x.is_finite() && y.is_finite()
    }

    fn nearest(&self, x: f32, y: f32, dst: &mut [u8]) {
        if !self.usable(x, y) {
            self.fill_border(dst);
            return;
        }
        let xi = (x + 0.5).floor() as i64;
        let yi = (y + 0.5).floor() as i64;
        for (c, d) in dst.iter_mut().enumerate() {
            *d = self.fetch(xi, yi, c) as u8;
        }
    }

    fn bilinear(&self, x: f32, y: f32, dst: &mut [u8]) {
        if !self.usable(x, y) {
            self.fill_border(dst);
            return;
        }
        let x0 = x.floor();
        let y0 = y.floor();
        let tx = x - x0;
        let ty = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);
        for (c, d) in dst.iter_mut().enumerate() {
            let top = self.fetch(x0, y0, c) * (1.0 - tx) + self.fetch(x0 + 1, y0, c) * tx;
            let bottom =
                self.fetch(x0, y0 + 1, c) * (1.0 - tx) + self.fetch(x0 + 1, y0 + 1, c) * tx;
            *d = to_u8(top * (1.0 - ty) + bottom * ty);
        }
    }

    fn bicubic(&self, x: f32, y: f32, dst: &mut [u8]) {
        if !self.usable(x, y) {
            self.fill_border(dst);
            return;
        }
        let x0 = x.floor();
        let y0 = y.floor();
        let wx = cubic_weights(x - x0);
        let wy = cubic_weights(y - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);
        for (c, d) in dst.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (j, wyj) in wy.iter().enumerate() {
                let yy = y0 - 1 + j as i64;
                let mut row = 0.0f32;
                for (i, wxi) in wx.iter().enumerate() {
                    row += wxi * self.fetch(x0 - 1 + i as i64, yy, c);
                }
                acc += wyj * row;
            }
            *d = to_u8(acc);
        }
    }
}

fn cubic_weights(t: f32) -> [f32; 4] {
    const A: f32 = -0.5;
    let k = |d: f32| -> f32 {
        let d = d.abs();
        if d <= 1.0 {
            (A + 2.0) * d * d * d - (A + 3.0) * d * d + 1.0
        } else if d < 2.0 {
            A * d * d * d - 5.0 * A * d * d + 8.0 * A * d - 4.0 * A
        } else {
            0.0
        }
    };
    [k(1.0 + t), k(t), k(1.0 - t), k(2.0 - t)]
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

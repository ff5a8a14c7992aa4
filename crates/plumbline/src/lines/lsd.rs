//! Line-segment detection by gradient region growing.
//!
//! Pixels are visited by decreasing gradient magnitude. Each unvisited seed
//! grows a region of 8-connected pixels whose gradient orientation stays
//! within a tolerance of the running region orientation. A region is then
//! fitted with a rectangle along its principal axis; regions that cover the
//! rectangle too sparsely are shrunk around the seed until they are dense
//! enough or too small.

use std::f64::consts::{PI, TAU};

use image::GrayImage;
use nalgebra::Matrix2;

use super::{EdgePoint, LineSegment};

/// Settings for the region-growing detector.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LsdConfig {
    /// Orientation tolerance for region growing (degrees).
    pub angle_tolerance_deg: f64,
    /// Minimum Scharr gradient magnitude for a pixel to take part.
    pub min_gradient: f32,
    /// Regions with fewer pixels are dropped.
    pub min_region_size: usize,
    /// Minimum fraction of the fitted rectangle covered by region pixels.
    pub min_density: f64,
    /// Radius shrink factor applied while a region is too sparse.
    pub shrink_factor: f64,
}

impl Default for LsdConfig {
    fn default() -> Self {
        Self {
            angle_tolerance_deg: 22.5,
            min_gradient: 80.0,
            min_region_size: 12,
            min_density: 0.7,
            shrink_factor: 0.75,
        }
    }
}

struct Gradients {
    width: usize,
    height: usize,
    mag: Vec<f32>,
    angle: Vec<f64>,
}

impl Gradients {
    fn compute(gray: &GrayImage) -> Self {
        let gx = imageproc::gradients::horizontal_scharr(gray);
        let gy = imageproc::gradients::vertical_scharr(gray);
        let (mag, angle) = gx
            .as_raw()
            .iter()
            .zip(gy.as_raw().iter())
            .map(|(&dx, &dy)| {
                let (dx, dy) = (dx as f32, dy as f32);
                (dx.hypot(dy), (dy as f64).atan2(dx as f64))
            })
            .unzip();
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            mag,
            angle,
        }
    }

    fn xy(&self, idx: usize) -> [f64; 2] {
        [(idx % self.width) as f64, (idx / self.width) as f64]
    }
}

/// Absolute difference of two orientations in `[0, π]`.
fn angle_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % TAU;
    if d > PI {
        TAU - d
    } else {
        d
    }
}

struct Rect {
    center: [f64; 2],
    dir: [f64; 2],
    t_min: f64,
    t_max: f64,
    d_min: f64,
    d_max: f64,
}

impl Rect {
    fn length(&self) -> f64 {
        self.t_max - self.t_min + 1.0
    }

    fn width(&self) -> f64 {
        self.d_max - self.d_min + 1.0
    }

    fn endpoints(&self) -> ([f64; 2], [f64; 2]) {
        let [cx, cy] = self.center;
        let [ux, uy] = self.dir;
        (
            [cx + self.t_min * ux, cy + self.t_min * uy],
            [cx + self.t_max * ux, cy + self.t_max * uy],
        )
    }
}

fn fit_rect(region: &[usize], grad: &Gradients, region_angle: f64, tol: f64) -> Option<Rect> {
    let mut sw = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for &i in region {
        let w = grad.mag[i] as f64;
        let [x, y] = grad.xy(i);
        sw += w;
        sx += w * x;
        sy += w * y;
    }
    if sw <= 0.0 {
        return None;
    }
    let center = [sx / sw, sy / sw];

    let mut cov = Matrix2::<f64>::zeros();
    for &i in region {
        let w = grad.mag[i] as f64;
        let [x, y] = grad.xy(i);
        let (dx, dy) = (x - center[0], y - center[1]);
        cov[(0, 0)] += w * dx * dx;
        cov[(0, 1)] += w * dx * dy;
        cov[(1, 1)] += w * dy * dy;
    }
    cov[(1, 0)] = cov[(0, 1)];

    let eig = cov.symmetric_eigen();
    let major = if eig.eigenvalues[0] >= eig.eigenvalues[1] {
        0
    } else {
        1
    };
    let v = eig.eigenvectors.column(major);
    let mut dir = [v[0], v[1]];

    // the level line is perpendicular to the gradient
    let level = [-region_angle.sin(), region_angle.cos()];
    if (dir[0] * level[0] + dir[1] * level[1]).abs() < tol.cos() {
        dir = level;
    }

    let mut rect = Rect {
        center,
        dir,
        t_min: f64::INFINITY,
        t_max: f64::NEG_INFINITY,
        d_min: f64::INFINITY,
        d_max: f64::NEG_INFINITY,
    };
    for &i in region {
        let [x, y] = grad.xy(i);
        let (dx, dy) = (x - center[0], y - center[1]);
        let t = dx * dir[0] + dy * dir[1];
        let d = -dx * dir[1] + dy * dir[0];
        rect.t_min = rect.t_min.min(t);
        rect.t_max = rect.t_max.max(t);
        rect.d_min = rect.d_min.min(d);
        rect.d_max = rect.d_max.max(d);
    }
    Some(rect)
}

fn grow_region(seed: usize, grad: &Gradients, used: &mut [bool], tol: f64) -> (Vec<usize>, f64) {
    let (w, h) = (grad.width, grad.height);
    let mut region = vec![seed];
    used[seed] = true;
    let mut sum_c = grad.angle[seed].cos();
    let mut sum_s = grad.angle[seed].sin();
    let mut region_angle = grad.angle[seed];

    let mut k = 0;
    while k < region.len() {
        let idx = region[k];
        k += 1;
        let (x, y) = (idx % w, idx / w);
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let j = ny * w + nx;
                if used[j] || angle_diff(grad.angle[j], region_angle) > tol {
                    continue;
                }
                used[j] = true;
                region.push(j);
                sum_c += grad.angle[j].cos();
                sum_s += grad.angle[j].sin();
                region_angle = sum_s.atan2(sum_c);
            }
        }
    }
    (region, region_angle)
}

pub(super) fn detect(gray: &GrayImage, cfg: &LsdConfig) -> Vec<LineSegment> {
    let grad = Gradients::compute(gray);
    let n = grad.width * grad.height;
    if n == 0 {
        return Vec::new();
    }
    let tol = cfg.angle_tolerance_deg.to_radians();
    let shrink = if cfg.shrink_factor > 0.0 && cfg.shrink_factor < 1.0 {
        cfg.shrink_factor
    } else {
        0.75
    };
    let min_size = cfg.min_region_size.max(2);

    let mut used: Vec<bool> = grad.mag.iter().map(|&m| m <= cfg.min_gradient).collect();
    let mut seeds: Vec<usize> = (0..n).filter(|&i| !used[i]).collect();
    seeds.sort_by(|&a, &b| grad.mag[b].total_cmp(&grad.mag[a]).then(a.cmp(&b)));

    let mut segments = Vec::new();
    for seed in seeds {
        if used[seed] {
            continue;
        }
        let (mut region, region_angle) = grow_region(seed, &grad, &mut used, tol);
        let seed_xy = grad.xy(seed);
        let mut radius = region
            .iter()
            .map(|&i| {
                let [x, y] = grad.xy(i);
                (x - seed_xy[0]).hypot(y - seed_xy[1])
            })
            .fold(0.0, f64::max);

        let rect = loop {
            if region.len() < min_size {
                break None;
            }
            let Some(rect) = fit_rect(&region, &grad, region_angle, tol) else {
                break None;
            };
            let density = region.len() as f64 / (rect.length() * rect.width());
            if density >= cfg.min_density {
                break Some(rect);
            }
            radius *= shrink;
            region.retain(|&i| {
                let [x, y] = grad.xy(i);
                let keep = (x - seed_xy[0]).hypot(y - seed_xy[1]) <= radius;
                if !keep {
                    used[i] = false;
                }
                keep
            });
        };

        let Some(rect) = rect else {
            continue;
        };
        let (p1, p2) = rect.endpoints();
        let support = region
            .iter()
            .map(|&i| EdgePoint {
                xy: grad.xy(i),
                weight: grad.mag[i] as f64,
            })
            .collect();
        segments.push(LineSegment::new(p1[0], p1[1], p2[0], p2[1]).with_support(support));
    }
    segments
}

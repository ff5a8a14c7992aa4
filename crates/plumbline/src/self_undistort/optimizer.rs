use rayon::prelude::*;

/// `n` evenly spaced values from `lo` to `hi` inclusive.
pub(crate) fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { hi } else { lo + step * i as f64 })
                .collect()
        }
    }
}

/// Coarse-to-fine grid search for the minimum of `cost` on `[lo, hi]`.
///
/// Each pass evaluates `grid_points` uniformly spaced candidates in parallel,
/// then narrows the bracket to ±2 grid steps around the best one (clamped to
/// the grid ends). Stops after `passes` passes or once the bracket is
/// narrower than `tolerance`. Ties resolve to the lowest grid index, and a
/// later pass only replaces the best point on strict improvement.
///
/// Returns `(x_min, cost_min)`. Non-finite costs never win.
pub fn coarse_to_fine_search<F>(
    cost: F,
    lo: f64,
    hi: f64,
    grid_points: usize,
    passes: usize,
    tolerance: f64,
) -> (f64, f64)
where
    F: Fn(f64) -> f64 + Sync,
{
    let grid_points = grid_points.max(2);
    let (mut lo, mut hi) = (lo, hi);
    let mut best = (lo, f64::INFINITY);

    for _ in 0..passes.max(1) {
        let grid = linspace(lo, hi, grid_points);
        let costs: Vec<f64> = grid
            .par_iter()
            .map(|&x| {
                let c = cost(x);
                if c.is_nan() {
                    f64::INFINITY
                } else {
                    c
                }
            })
            .collect();

        let mut idx = 0;
        for (i, &c) in costs.iter().enumerate() {
            if c < costs[idx] {
                idx = i;
            }
        }
        if costs[idx] < best.1 {
            best = (grid[idx], costs[idx]);
        }

        lo = grid[idx.saturating_sub(2)];
        hi = grid[(idx + 2).min(grid_points - 1)];
        if (hi - lo).abs() < tolerance {
            break;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn linspace_hits_both_ends() {
        let v = linspace(-0.8, 0.8, 41);
        assert_eq!(v.len(), 41);
        assert_eq!(v[0], -0.8);
        assert_eq!(v[40], 0.8);
        assert_abs_diff_eq!(v[20], 0.0, epsilon = 1e-12);
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
    }

    #[test]
    fn finds_quadratic_minimum_off_grid() {
        let (x, c) = coarse_to_fine_search(|x| (x - 0.1234).powi(2), -0.8, 0.8, 41, 3, 1e-5);
        assert_abs_diff_eq!(x, 0.1234, epsilon = 5e-4);
        assert!(c < 1e-6);
    }

    #[test]
    fn minimum_at_bound_is_reachable() {
        let (x, _) = coarse_to_fine_search(|x| -x, -0.8, 0.8, 41, 3, 1e-5);
        assert_eq!(x, 0.8);
        let (x, _) = coarse_to_fine_search(|x| x, -0.8, 0.8, 41, 3, 1e-5);
        assert_eq!(x, -0.8);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let (x, c) = coarse_to_fine_search(|_| 1.0, -0.5, 0.5, 11, 3, 1e-5);
        assert_eq!(x, -0.5);
        assert_eq!(c, 1.0);
    }

    #[test]
    fn nan_costs_never_win() {
        let (x, c) = coarse_to_fine_search(
            |x| if x < 0.0 { f64::NAN } else { x + 1.0 },
            -1.0,
            1.0,
            21,
            1,
            1e-5,
        );
        assert_eq!(x, 0.0);
        assert_eq!(c, 1.0);
    }

    #[test]
    fn narrow_bracket_stops_early() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let _ = coarse_to_fine_search(
            |x| {
                calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                x * x
            },
            -1e-6,
            1e-6,
            5,
            10,
            1e-5,
        );
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 5);
    }
}

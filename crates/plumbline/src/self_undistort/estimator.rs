use image::GrayImage;

use crate::pixelmap::DivisionModel;

use super::config::{ObjectiveKind, SelfUndistortConfig};
use super::objective::{
    line_length_score, sample_segments, straightness_cost, SampledSegment, INVALID_COST,
};
use super::optimizer::{coarse_to_fine_search, linspace};
use super::result::{EstimateError, LineEvidence, SelfUndistortResult};

enum ObjectiveStrategy<'a> {
    Straightness { segments: Vec<SampledSegment> },
    LineLength { frames: &'a [GrayImage] },
}

impl ObjectiveStrategy<'_> {
    fn cost(&self, model: &DivisionModel, config: &SelfUndistortConfig) -> f64 {
        match self {
            Self::Straightness { segments } => {
                straightness_cost(model, segments, config.length_weight)
            }
            Self::LineLength { frames } => {
                -line_length_score(model, frames, &config.line_length)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OptimizationOutcome {
    center: [f64; 2],
    lambda_opt: f64,
    cost: f64,
}

/// Estimate a division model from line evidence.
///
/// `image_size` is the resolution the evidence was gathered at; it fixes the
/// initial principal point (image center) and `scale_norm`.
pub fn estimate_self_undistort(
    evidence: &LineEvidence,
    image_size: [u32; 2],
    config: &SelfUndistortConfig,
) -> Result<SelfUndistortResult, EstimateError> {
    validate(image_size, config)?;
    let strategy = select_objective_strategy(evidence, config)?;

    let scale_norm = config.normalization.radius(image_size[0], image_size[1]);
    let base = DivisionModel::new(
        0.0,
        image_size[0] as f64 / 2.0,
        image_size[1] as f64 / 2.0,
        scale_norm,
    );

    let outcome = candidate_centers(base.cx, base.cy, image_size, config)
        .into_iter()
        .map(|center| {
            optimize_at_center(&strategy, base.with_center(center[0], center[1]), config)
        })
        .fold(None, |best: Option<OptimizationOutcome>, o| match best {
            Some(b) if b.cost <= o.cost => Some(b),
            _ => Some(o),
        })
        .ok_or_else(|| EstimateError::InvalidRange("empty center grid".to_string()))?;

    let model = base
        .with_center(outcome.center[0], outcome.center[1])
        .with_lambda(outcome.lambda_opt);
    let cost_at_zero = strategy.cost(&model.with_lambda(0.0), config);

    let n_segments = evidence.segments.len();
    let low_evidence = match config.objective {
        ObjectiveKind::Straightness => n_segments < config.min_segments,
        ObjectiveKind::LineLength => outcome.cost >= 0.0,
    };
    if outcome.cost >= INVALID_COST {
        tracing::warn!("every candidate was degenerate; estimate is unreliable");
    }

    tracing::info!(
        "lambda={:.6} center=({:.1}, {:.1}) cost {:.3e} -> {:.3e} ({} segs, {} frames)",
        model.lambda,
        model.cx,
        model.cy,
        cost_at_zero,
        outcome.cost,
        n_segments,
        evidence.n_frames
    );

    Ok(SelfUndistortResult {
        model,
        objective: config.objective,
        cost: outcome.cost,
        cost_at_zero,
        n_segments,
        n_frames: evidence.n_frames,
        low_evidence,
    })
}

fn validate(image_size: [u32; 2], config: &SelfUndistortConfig) -> Result<(), EstimateError> {
    let [lo, hi] = config.lambda_range;
    if !lo.is_finite() || !hi.is_finite() || lo >= hi {
        return Err(EstimateError::InvalidRange(format!(
            "lambda range [{lo}, {hi}] is empty or not finite"
        )));
    }
    if config.grid_points < 2 {
        return Err(EstimateError::InvalidRange(format!(
            "grid_points must be at least 2 (got {})",
            config.grid_points
        )));
    }
    if config.refine_iters == 0 {
        return Err(EstimateError::InvalidRange(
            "refine_iters must be at least 1".to_string(),
        ));
    }
    if config.samples_per_segment < 2 {
        return Err(EstimateError::InvalidRange(format!(
            "samples_per_segment must be at least 2 (got {})",
            config.samples_per_segment
        )));
    }
    if config.center_search.enable && config.center_search.steps == 0 {
        return Err(EstimateError::InvalidRange(
            "center_search.steps must be at least 1".to_string(),
        ));
    }
    if image_size[0] == 0 || image_size[1] == 0 {
        return Err(EstimateError::InvalidRange(format!(
            "image size {}x{} is empty",
            image_size[0], image_size[1]
        )));
    }
    Ok(())
}

fn select_objective_strategy<'a>(
    evidence: &'a LineEvidence,
    config: &SelfUndistortConfig,
) -> Result<ObjectiveStrategy<'a>, EstimateError> {
    let insufficient = || EstimateError::InsufficientEvidence {
        segments: evidence.segments.len(),
        frames: evidence.n_frames,
    };
    match config.objective {
        ObjectiveKind::Straightness => {
            let segments = sample_segments(&evidence.segments, config.samples_per_segment);
            if segments.is_empty() {
                return Err(insufficient());
            }
            Ok(ObjectiveStrategy::Straightness { segments })
        }
        ObjectiveKind::LineLength => {
            if evidence.frames.is_empty() {
                return Err(insufficient());
            }
            Ok(ObjectiveStrategy::LineLength {
                frames: &evidence.frames,
            })
        }
    }
}

/// Principal points to try: the image center alone, or a `steps × steps`
/// grid spanning `± round(frac · size)` around it.
fn candidate_centers(
    cx0: f64,
    cy0: f64,
    image_size: [u32; 2],
    config: &SelfUndistortConfig,
) -> Vec<[f64; 2]> {
    let cs = &config.center_search;
    if !cs.enable {
        return vec![[cx0, cy0]];
    }
    let dx = (image_size[0] as f64 * cs.frac).round();
    let dy = (image_size[1] as f64 * cs.frac).round();
    let xs = linspace(cx0 - dx, cx0 + dx, cs.steps);
    let ys = linspace(cy0 - dy, cy0 + dy, cs.steps);
    xs.iter()
        .flat_map(|&x| ys.iter().map(move |&y| [x, y]))
        .collect()
}

fn optimize_at_center(
    strategy: &ObjectiveStrategy<'_>,
    model: DivisionModel,
    config: &SelfUndistortConfig,
) -> OptimizationOutcome {
    let (lambda_opt, cost) = coarse_to_fine_search(
        |lambda| strategy.cost(&model.with_lambda(lambda), config),
        config.lambda_range[0],
        config.lambda_range[1],
        config.grid_points,
        config.refine_iters,
        config.tolerance,
    );
    tracing::debug!(
        "center ({:.1}, {:.1}): lambda={:.6} cost={:.4e}",
        model.cx,
        model.cy,
        lambda_opt,
        cost
    );
    OptimizationOutcome {
        center: [model.cx, model.cy],
        lambda_opt,
        cost,
    }
}

use super::*;
use crate::lines::{EdgePoint, LineSegment};
use crate::pixelmap::{DivisionModel, NormalizationRadius};
use crate::test_utils::{blur_gray, render_distorted_edge};

/// What a camera with `model` records of the straight scene line `a`–`b`:
/// distorted samples every half pixel as support, endpoints at the first
/// and last in-frame sample.
fn distorted_line(model: &DivisionModel, a: [f64; 2], b: [f64; 2], w: u32, h: u32) -> LineSegment {
    let len = (b[0] - a[0]).hypot(b[1] - a[1]);
    let n = (len * 2.0).ceil() as usize;
    let support: Vec<EdgePoint> = (0..=n)
        .filter_map(|i| {
            let t = i as f64 / n as f64;
            let p = [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])];
            model.distort_point_checked(p)
        })
        .filter(|p| p[0] >= 0.0 && p[1] >= 0.0 && p[0] < w as f64 && p[1] < h as f64)
        .map(|xy| EdgePoint { xy, weight: 1.0 })
        .collect();
    let first = support.first().expect("line visible").xy;
    let last = support.last().expect("line visible").xy;
    LineSegment::new(first[0], first[1], last[0], last[1]).with_support(support)
}

fn box_lines(model: &DivisionModel, w: u32, h: u32) -> Vec<LineSegment> {
    let (wf, hf) = (w as f64, h as f64);
    vec![
        distorted_line(model, [20.0, 40.0], [wf - 20.0, 40.0], w, h),
        distorted_line(model, [20.0, hf - 40.0], [wf - 20.0, hf - 40.0], w, h),
        distorted_line(model, [60.0, 20.0], [60.0, hf - 20.0], w, h),
        distorted_line(model, [wf - 60.0, 20.0], [wf - 60.0, hf - 20.0], w, h),
    ]
}

#[test]
fn recovers_lambda_from_a_single_distorted_line() {
    let truth = DivisionModel::centered(0.15, 320, 240, NormalizationRadius::MaxDimension);
    let seg = distorted_line(&truth, [10.0, 30.0], [310.0, 30.0], 320, 240);
    let evidence = LineEvidence::from_segments(vec![seg], 1);

    let res = estimate_self_undistort(&evidence, [320, 240], &SelfUndistortConfig::default())
        .expect("estimate");
    assert!(
        (res.model.lambda - 0.15).abs() < 0.01,
        "lambda {}",
        res.model.lambda
    );
    assert_eq!(res.model.cx, 160.0);
    assert_eq!(res.model.cy, 120.0);
    assert_eq!(res.model.scale_norm, 320.0);
    assert!(res.low_evidence);
}

#[test]
fn estimate_stays_in_bounds_and_beats_identity() {
    let truth = DivisionModel::centered(-0.25, 480, 360, NormalizationRadius::MaxDimension);
    let evidence = LineEvidence::from_segments(box_lines(&truth, 480, 360), 1);
    let config = SelfUndistortConfig {
        lambda_range: [-0.2, 0.5],
        ..SelfUndistortConfig::default()
    };
    let res = estimate_self_undistort(&evidence, [480, 360], &config).expect("estimate");
    // truth lies outside the range: the estimate hugs the lower bound
    assert!(res.model.lambda >= -0.2 && res.model.lambda <= 0.5);
    assert!(res.model.lambda < -0.15);
    assert!(res.cost <= res.cost_at_zero);
    assert!(res.improvement() > 0.0);
}

#[test]
fn center_search_recovers_offset_principal_point() {
    let truth = DivisionModel::new(-0.3, 339.0, 240.0, 640.0);
    let evidence = LineEvidence::from_segments(box_lines(&truth, 640, 480), 1);
    let config = SelfUndistortConfig {
        center_search: CenterSearchConfig {
            enable: true,
            ..CenterSearchConfig::default()
        },
        ..SelfUndistortConfig::default()
    };
    let res = estimate_self_undistort(&evidence, [640, 480], &config).expect("estimate");
    assert_eq!(res.model.cx, 339.0);
    assert_eq!(res.model.cy, 240.0);
    assert!((res.model.lambda + 0.3).abs() < 0.01, "lambda {}", res.model.lambda);

    let fixed = estimate_self_undistort(&evidence, [640, 480], &SelfUndistortConfig::default())
        .expect("estimate");
    assert_eq!(fixed.model.cx, 320.0);
    assert!(res.cost < fixed.cost);
}

#[test]
fn zero_segments_is_insufficient_evidence() {
    let evidence = LineEvidence::from_segments(Vec::new(), 12);
    let err = estimate_self_undistort(&evidence, [640, 360], &SelfUndistortConfig::default())
        .expect_err("no evidence");
    assert_eq!(
        err,
        EstimateError::InsufficientEvidence {
            segments: 0,
            frames: 12
        }
    );
}

#[test]
fn line_length_without_frames_is_insufficient_evidence() {
    let truth = DivisionModel::centered(0.1, 320, 240, NormalizationRadius::MaxDimension);
    let evidence = LineEvidence::from_segments(box_lines(&truth, 320, 240), 3);
    let config = SelfUndistortConfig {
        objective: ObjectiveKind::LineLength,
        ..SelfUndistortConfig::default()
    };
    assert!(matches!(
        estimate_self_undistort(&evidence, [320, 240], &config),
        Err(EstimateError::InsufficientEvidence { .. })
    ));
}

#[test]
fn bad_search_settings_are_rejected() {
    let truth = DivisionModel::centered(0.1, 320, 240, NormalizationRadius::MaxDimension);
    let evidence = LineEvidence::from_segments(box_lines(&truth, 320, 240), 1);
    let cases = [
        SelfUndistortConfig {
            lambda_range: [0.5, -0.5],
            ..SelfUndistortConfig::default()
        },
        SelfUndistortConfig {
            lambda_range: [f64::NAN, 0.5],
            ..SelfUndistortConfig::default()
        },
        SelfUndistortConfig {
            grid_points: 1,
            ..SelfUndistortConfig::default()
        },
        SelfUndistortConfig {
            refine_iters: 0,
            ..SelfUndistortConfig::default()
        },
    ];
    for config in cases {
        assert!(matches!(
            estimate_self_undistort(&evidence, [320, 240], &config),
            Err(EstimateError::InvalidRange(_))
        ));
    }
}

#[test]
fn line_length_objective_runs_on_frames() {
    let truth = DivisionModel::centered(0.15, 160, 120, NormalizationRadius::MaxDimension);
    let frame = blur_gray(
        &render_distorted_edge(160, 120, &truth, 20.0, 200, 40, 2),
        0.8,
    );
    let evidence = LineEvidence {
        segments: Vec::new(),
        frames: vec![frame],
        n_frames: 1,
    };
    let config = SelfUndistortConfig {
        objective: ObjectiveKind::LineLength,
        grid_points: 5,
        refine_iters: 1,
        ..SelfUndistortConfig::default()
    };
    let res = estimate_self_undistort(&evidence, [160, 120], &config).expect("estimate");
    assert_eq!(res.objective, ObjectiveKind::LineLength);
    assert!(res.model.lambda >= -0.8 && res.model.lambda <= 0.8);
    // λ = 0 is on the 5-point grid
    assert!(res.cost <= res.cost_at_zero);
    assert!(res.cost < 0.0, "some line length is found");
}

#[test]
fn config_accepts_cli_style_aliases() {
    let cfg: SelfUndistortConfig = serde_json::from_str(
        r#"{"lambda_bounds": [-0.5, 0.5], "pp_refine": {"enable": true}}"#,
    )
    .expect("parse");
    assert_eq!(cfg.lambda_range, [-0.5, 0.5]);
    assert!(cfg.center_search.enable);
    assert_eq!(cfg.center_search.steps, 3);
    assert_eq!(cfg.grid_points, 41);
}

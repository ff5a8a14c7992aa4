//! End-to-end runs on rendered footage of a straight edge seen through a
//! known division model.

use image::{GrayImage, Luma, Rgb, RgbImage};
use plumbline::video::{MemorySink, MemoryVideo};
use plumbline::{
    process_video, run_pipeline, AbortFlag, BorderMode, CalibrationParameters, DivisionModel,
    ExtractConfig, FrameSink, HoughConfig, LineDetector, NormalizationRadius, PipelineConfig,
    PipelineError, PipelineWarning, VideoError,
};

const BRIGHT: u8 = 200;
const DARK: u8 = 40;

/// Camera view of a scene that is bright above `edge_y_u` and dark below.
fn render_edge(w: u32, h: u32, model: &DivisionModel, edge_y_u: f64) -> GrayImage {
    const SS: u32 = 4;
    let n = (SS * SS) as f64;
    let sharp = GrayImage::from_fn(w, h, |x, y| {
        let mut below = 0u32;
        for j in 0..SS {
            for i in 0..SS {
                let px = x as f64 - 0.5 + (i as f64 + 0.5) / SS as f64;
                let py = y as f64 - 0.5 + (j as f64 + 0.5) / SS as f64;
                let yu = model.undistort_point([px, py]).map_or(py, |p| p[1]);
                if yu >= edge_y_u {
                    below += 1;
                }
            }
        }
        let frac = below as f64 / n;
        Luma([(BRIGHT as f64 * (1.0 - frac) + DARK as f64 * frac).round() as u8])
    });
    let f = image::ImageBuffer::<Luma<f32>, Vec<f32>>::from_fn(w, h, |x, y| {
        Luma([sharp.get_pixel(x, y)[0] as f32])
    });
    let blurred = imageproc::filter::gaussian_blur_f32(&f, 1.0);
    GrayImage::from_fn(w, h, |x, y| {
        Luma([blurred.get_pixel(x, y)[0].round().clamp(0.0, 255.0) as u8])
    })
}

fn to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}

fn edge_video(n: usize, w: u32, h: u32, lambda: f64, edge_y_u: f64) -> MemoryVideo {
    let truth = DivisionModel::centered(lambda, w, h, NormalizationRadius::MaxDimension);
    let frame = to_rgb(&render_edge(w, h, &truth, edge_y_u));
    MemoryVideo::new(vec![frame; n], 30.0)
}

/// Row where column `x` crosses the mid level between the two tones.
fn crossing(img: &RgbImage, x: u32) -> Option<f64> {
    let level = (BRIGHT as f64 + DARK as f64) / 2.0;
    (0..img.height() - 1).find_map(|y| {
        let a = img.get_pixel(x, y)[0] as f64 - level;
        let b = img.get_pixel(x, y + 1)[0] as f64 - level;
        (a >= 0.0 && b < 0.0).then(|| y as f64 + a / (a - b))
    })
}

fn crossing_spread(img: &RgbImage, xs: impl Iterator<Item = u32>) -> f64 {
    let ys: Vec<f64> = xs
        .map(|x| crossing(img, x).expect("edge crosses every column"))
        .collect();
    let max = ys.iter().copied().fold(f64::MIN, f64::max);
    let min = ys.iter().copied().fold(f64::MAX, f64::min);
    max - min
}

fn columns() -> impl Iterator<Item = u32> {
    (40..=280).step_by(10)
}

#[test]
fn recovers_lambda_and_straightens_the_edge() {
    let truth = DivisionModel::centered(0.15, 320, 240, NormalizationRadius::MaxDimension);
    let frame = to_rgb(&render_edge(320, 240, &truth, 30.0));
    let input_spread = crossing_spread(&frame, columns());
    assert!(input_spread > 1.5, "input edge spread {input_spread}");
    let mut source = MemoryVideo::new(vec![frame; 10], 30.0);

    let config = PipelineConfig {
        border: BorderMode::Replicate,
        ..PipelineConfig::default()
    };
    let mut sink = MemorySink::new();
    let report = run_pipeline(&mut source, &mut sink, &config, &AbortFlag::new()).unwrap();

    let est = report.estimate.as_ref().expect("estimated, not loaded");
    assert!(
        (report.params.lambda - 0.15).abs() < 0.02,
        "lambda {}",
        report.params.lambda
    );
    assert!(est.cost <= est.cost_at_zero);
    assert_eq!((report.params.cx, report.params.cy), (160.0, 120.0));
    assert_eq!(report.frames_written, 10);
    assert_eq!(sink.frames().len(), 10);
    assert!(sink.is_finished());

    let output_spread = crossing_spread(&sink.frames()[0], columns());
    assert!(output_spread < 0.6, "output edge spread {output_spread}");
}

#[test]
fn downscaled_estimate_is_lifted_to_full_resolution() {
    let mut source = edge_video(4, 640, 480, 0.15, 60.0);
    let config = PipelineConfig {
        downscale_width: 320,
        sample_frames: 4,
        border: BorderMode::Replicate,
        ..PipelineConfig::default()
    };
    let mut sink = MemorySink::new();
    let report = run_pipeline(&mut source, &mut sink, &config, &AbortFlag::new()).unwrap();

    let est = report.estimate.as_ref().unwrap();
    assert_eq!(
        (est.model.cx, est.model.cy, est.model.scale_norm),
        (160.0, 120.0, 320.0)
    );
    assert_eq!(
        (report.params.width, report.params.height),
        (640, 480)
    );
    assert_eq!(
        (report.params.cx, report.params.cy, report.params.scale_norm),
        (320.0, 240.0, 640.0)
    );
    assert!(
        (report.params.lambda - 0.15).abs() < 0.03,
        "lambda {}",
        report.params.lambda
    );
    assert_eq!(sink.frames()[0].dimensions(), (640, 480));
}

#[test]
fn short_video_without_frame_count_is_counted_then_sampled() {
    let mut source = edge_video(20, 320, 240, 0.15, 30.0).without_frame_count();
    let config = PipelineConfig {
        sample_frames: 4,
        ..PipelineConfig::default()
    };
    let mut sink = MemorySink::new();
    let report = run_pipeline(&mut source, &mut sink, &config, &AbortFlag::new()).unwrap();

    assert!(report
        .warnings
        .contains(&PipelineWarning::UnreliableFrameCount { planned: 20 }));
    let est = report.estimate.as_ref().unwrap();
    assert_eq!(est.n_frames, 4);
    assert!(
        (report.params.lambda - 0.15).abs() < 0.02,
        "lambda {}",
        report.params.lambda
    );
    assert_eq!(report.frames_written, 20);
    assert_eq!(sink.frames().len(), 20);
}

#[test]
fn hough_detector_recovers_lambda() {
    let mut source = edge_video(10, 320, 240, 0.15, 30.0);
    let config = PipelineConfig {
        extract: ExtractConfig {
            detector: LineDetector::Hough(HoughConfig::default()),
            ..ExtractConfig::default()
        },
        ..PipelineConfig::default()
    };
    let mut sink = MemorySink::new();
    let report = run_pipeline(&mut source, &mut sink, &config, &AbortFlag::new()).unwrap();

    let est = report.estimate.as_ref().unwrap();
    assert!(est.cost <= est.cost_at_zero);
    assert!(
        (report.params.lambda - 0.15).abs() < 0.03,
        "lambda {}",
        report.params.lambda
    );
}

#[test]
fn record_with_other_resolution_is_applied_with_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let record = dir.path().join("calib.json");
    CalibrationParameters {
        width: 640,
        height: 480,
        cx: 320.0,
        cy: 240.0,
        lambda: 0.1,
        scale_norm: 640.0,
    }
    .save_json(&record)
    .unwrap();

    let config = PipelineConfig {
        calibration_in: Some(record),
        ..PipelineConfig::default()
    };
    let mut sink = MemorySink::new();
    let report = run_pipeline(
        &mut edge_video(3, 320, 240, 0.15, 30.0),
        &mut sink,
        &config,
        &AbortFlag::new(),
    )
    .unwrap();

    assert!(report.estimate.is_none());
    assert_eq!(report.params.lambda, 0.1);
    assert_eq!(report.frames_written, 3);
    assert!(report.warnings.contains(&PipelineWarning::ResolutionMismatch {
        record: (640, 480),
        video: (320, 240),
    }));
}

/// Sink that raises the abort flag after a number of frames.
struct AbortingSink {
    inner: MemorySink,
    abort: AbortFlag,
    after: usize,
}

impl FrameSink for AbortingSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), VideoError> {
        self.inner.write_frame(frame)?;
        if self.inner.frames().len() == self.after {
            self.abort.raise();
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        self.inner.finish()
    }
}

#[test]
fn abort_stops_between_frames() {
    let dir = tempfile::tempdir().unwrap();
    let record = dir.path().join("calib.json");
    CalibrationParameters::from_model(&DivisionModel::identity(32, 24), 32, 24)
        .save_json(&record)
        .unwrap();
    let config = PipelineConfig {
        calibration_in: Some(record),
        ..PipelineConfig::default()
    };

    let abort = AbortFlag::new();
    let mut sink = AbortingSink {
        inner: MemorySink::new(),
        abort: abort.clone(),
        after: 3,
    };
    let frames = vec![RgbImage::from_pixel(32, 24, Rgb([1, 2, 3])); 8];
    let err = run_pipeline(
        &mut MemoryVideo::new(frames, 30.0),
        &mut sink,
        &config,
        &abort,
    )
    .unwrap_err();

    assert!(matches!(err, PipelineError::Aborted { frames_written: 3 }));
    assert_eq!(sink.inner.frames().len(), 3);
}

#[test]
fn image_sequence_directories_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("frames");
    let output = dir.path().join("corrected");
    let overlays = dir.path().join("overlays");
    let record = dir.path().join("calib").join("record.json");
    std::fs::create_dir_all(&input).unwrap();

    let truth = DivisionModel::centered(0.15, 320, 240, NormalizationRadius::MaxDimension);
    let frame = to_rgb(&render_edge(320, 240, &truth, 30.0));
    for i in 0..6 {
        frame.save(input.join(format!("img_{i:04}.png"))).unwrap();
    }

    let config = PipelineConfig {
        margin_ratio: 0.0,
        sample_frames: 3,
        calibration_out: Some(record.clone()),
        overlay_dir: Some(overlays.clone()),
        ..PipelineConfig::default()
    };
    let report = process_video(&input, &output, &config, &AbortFlag::new()).unwrap();
    assert_eq!(report.frames_written, 6);
    assert!(!report
        .warnings
        .iter()
        .any(|w| matches!(w, PipelineWarning::SkippedSampleFrames { .. })));

    let written: Vec<_> = std::fs::read_dir(&output).unwrap().collect();
    assert_eq!(written.len(), 6);
    assert!(overlays.join("segments_frame_000000.png").is_file());
    assert!(overlays.join("segments_frame_000005.png").is_file());

    let saved = CalibrationParameters::load_json(&record, NormalizationRadius::MaxDimension)
        .unwrap();
    assert_eq!(saved, report.params);
    assert!((saved.lambda - 0.15).abs() < 0.02, "lambda {}", saved.lambda);
}

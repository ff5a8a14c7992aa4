//! plumbline CLI — self-calibrating lens distortion correction for videos.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use plumbline::pipeline::{calibrate_source, RunStatus};
use plumbline::video::open_source;
use plumbline::{
    process_video, remap_image, AbortFlag, BorderMode, CalibrationParameters, HoughConfig,
    Interpolation, LineDetector, LsdConfig, ObjectiveKind, PipelineConfig, PipelineWarning,
    RemapTable,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "plumbline")]
#[command(about = "Estimate and remove radial lens distortion from uncalibrated videos")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the distortion of a video and write the corrected video.
    Undistort(CliUndistortArgs),

    /// Estimate the distortion of a video and save the calibration record.
    Calibrate(CliCalibrateArgs),

    /// Apply a calibration record to a single image.
    RemapImage(CliRemapImageArgs),
}

// ── Shared options ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Args)]
struct CliEstimateArgs {
    /// JSON pipeline configuration; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of frames sampled for calibration (capped at 50).
    #[arg(long)]
    sample_frames: Option<usize>,

    /// Working width for line detection and estimation.
    #[arg(long)]
    downscale_width: Option<u32>,

    /// Also search the principal point on a small grid around the center.
    #[arg(long, visible_alias = "optimize-center")]
    pp_refine: bool,

    /// Search interval for lambda.
    #[arg(long, num_args = 2, value_names = ["LO", "HI"], allow_negative_numbers = true)]
    lambda_bounds: Option<Vec<f64>>,

    /// Objective minimized over lambda.
    #[arg(long, value_enum)]
    objective: Option<ObjectiveArg>,

    /// Line segment detector.
    #[arg(long, value_enum)]
    detector: Option<DetectorArg>,

    /// Frame rate for image sequences and sources without one.
    #[arg(long)]
    fps: Option<f64>,

    /// Write segment overlays of the sampled frames into this directory.
    #[arg(long)]
    visualize_segments: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ObjectiveArg {
    Straightness,
    LineLength,
}

impl ObjectiveArg {
    fn to_core(self) -> ObjectiveKind {
        match self {
            Self::Straightness => ObjectiveKind::Straightness,
            Self::LineLength => ObjectiveKind::LineLength,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DetectorArg {
    Lsd,
    Hough,
}

impl DetectorArg {
    /// Keep the configured detector settings when the kind already matches.
    fn to_core(self, current: &LineDetector) -> LineDetector {
        match (self, current) {
            (Self::Lsd, LineDetector::Lsd(_)) | (Self::Hough, LineDetector::Hough(_)) => {
                current.clone()
            }
            (Self::Lsd, _) => LineDetector::Lsd(LsdConfig::default()),
            (Self::Hough, _) => LineDetector::Hough(HoughConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BorderArg {
    Constant,
    Replicate,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InterpolationArg {
    Nearest,
    Bilinear,
    Bicubic,
}

impl InterpolationArg {
    fn to_core(self) -> Interpolation {
        match self {
            Self::Nearest => Interpolation::Nearest,
            Self::Bilinear => Interpolation::Bilinear,
            Self::Bicubic => Interpolation::Bicubic,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CliRemapArgs {
    /// Output field-of-view scale (>1 crops into the image).
    #[arg(long)]
    zoom: Option<f64>,

    /// Value of output pixels whose source falls outside the frame.
    #[arg(long, value_enum)]
    border: Option<BorderArg>,

    /// Gray level used with `--border constant`.
    #[arg(long, default_value_t = 0)]
    border_value: u8,

    /// Resampling filter.
    #[arg(long, value_enum)]
    interpolation: Option<InterpolationArg>,
}

impl CliRemapArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(zoom) = self.zoom {
            config.zoom = zoom;
        }
        if let Some(border) = self.border {
            config.border = match border {
                BorderArg::Constant => BorderMode::Constant(self.border_value),
                BorderArg::Replicate => BorderMode::Replicate,
            };
        }
        if let Some(interp) = self.interpolation {
            config.interpolation = interp.to_core();
        }
    }
}

impl CliEstimateArgs {
    fn to_config(&self) -> CliResult<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(n) = self.sample_frames {
            config.sample_frames = n;
        }
        if let Some(w) = self.downscale_width {
            config.downscale_width = w;
        }
        if self.pp_refine {
            config.estimate.center_search.enable = true;
        }
        if let Some(bounds) = &self.lambda_bounds {
            let [lo, hi] = bounds.as_slice() else {
                return Err("--lambda-bounds takes exactly two values".into());
            };
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(format!("invalid --lambda-bounds {lo} {hi}: need LO < HI").into());
            }
            config.estimate.lambda_range = [*lo, *hi];
        }
        if let Some(objective) = self.objective {
            config.estimate.objective = objective.to_core();
        }
        if let Some(detector) = self.detector {
            config.extract.detector = detector.to_core(&config.extract.detector);
        }
        if let Some(fps) = self.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(format!("invalid --fps {fps}").into());
            }
            config.default_fps = fps;
        }
        if let Some(dir) = &self.visualize_segments {
            config.overlay_dir = Some(dir.clone());
        }
        Ok(config)
    }
}

// ── Subcommand arguments ───────────────────────────────────────────────────

#[derive(Debug, Clone, Args)]
struct CliUndistortArgs {
    /// Input video file or directory of frames.
    #[arg(long)]
    input: PathBuf,

    /// Output video file, or a directory for numbered PNG frames.
    #[arg(long)]
    output: PathBuf,

    #[command(flatten)]
    estimate: CliEstimateArgs,

    #[command(flatten)]
    remap: CliRemapArgs,

    /// Encoder for video file outputs (e.g. mpeg4, libx264).
    #[arg(long)]
    codec: Option<String>,

    /// Apply this calibration record instead of estimating.
    #[arg(long)]
    calib_json: Option<PathBuf>,

    /// Save the estimated calibration record.
    #[arg(long)]
    save_calib: Option<PathBuf>,

    /// Copy the input's audio track (needs `ffmpeg` on PATH).
    #[arg(long)]
    copy_audio: bool,

    /// Write the run report (JSON).
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CliCalibrateArgs {
    /// Input video file or directory of frames.
    #[arg(long)]
    input: PathBuf,

    /// Calibration record to write (JSON).
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    estimate: CliEstimateArgs,
}

#[derive(Debug, Clone, Args)]
struct CliRemapImageArgs {
    /// Image to correct.
    #[arg(long)]
    image: PathBuf,

    /// Calibration record (JSON).
    #[arg(long)]
    calib_json: PathBuf,

    /// Corrected image path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    remap: CliRemapArgs,
}

// ── Commands ───────────────────────────────────────────────────────────────

fn install_abort_handler() -> AbortFlag {
    let abort = AbortFlag::new();
    let handle = abort.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::warn!("interrupt received; stopping after the current frame");
        handle.raise();
    }) {
        tracing::warn!("could not install Ctrl-C handler: {}", e);
    }
    abort
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> CliResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    tracing::info!("Report written to {}", path.display());
    Ok(())
}

fn run_undistort(args: &CliUndistortArgs) -> CliResult<RunStatus> {
    let mut config = args.estimate.to_config()?;
    args.remap.apply(&mut config);
    if let Some(codec) = &args.codec {
        config.output_codec = codec.clone();
    }
    if let Some(path) = &args.calib_json {
        config.calibration_in = Some(path.clone());
    }
    if let Some(path) = &args.save_calib {
        config.calibration_out = Some(path.clone());
    }
    config.copy_audio |= args.copy_audio;

    tracing::info!(
        "Undistorting {} -> {}",
        args.input.display(),
        args.output.display()
    );
    let abort = install_abort_handler();
    let result = process_video(&args.input, &args.output, &config, &abort);

    if let Ok(report) = &result {
        tracing::info!(
            "lambda={:.6} center=({:.1}, {:.1}), {} frames written",
            report.params.lambda,
            report.params.cx,
            report.params.cy,
            report.frames_written
        );
        if let Some(path) = &args.report {
            write_json(path, report)?;
        }
    }
    Ok(RunStatus::from_result(&result))
}

fn run_calibrate(args: &CliCalibrateArgs) -> CliResult<RunStatus> {
    let mut config = args.estimate.to_config()?;
    config.calibration_out = Some(args.out.clone());

    let abort = install_abort_handler();
    let mut source = open_source(&args.input, config.default_fps)?;
    match calibrate_source(source.as_mut(), &config, &abort) {
        Ok(report) => {
            tracing::info!(
                "lambda={:.6} center=({:.1}, {:.1}), cost {:.4e} (at lambda=0: {:.4e})",
                report.params.lambda,
                report.params.cx,
                report.params.cy,
                report.estimate.cost,
                report.estimate.cost_at_zero
            );
            Ok(RunStatus::from_warnings(&report.warnings))
        }
        Err(e) => Ok(RunStatus::Failure(e.to_string())),
    }
}

fn run_remap_image(args: &CliRemapImageArgs) -> CliResult<RunStatus> {
    let mut config = PipelineConfig::default();
    args.remap.apply(&mut config);

    let params =
        CalibrationParameters::load_json(&args.calib_json, config.estimate.normalization)?;
    let img = image::open(&args.image).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", args.image.display(), e).into()
    })?;
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();

    let mut warnings = Vec::new();
    if (params.width, params.height) != (w, h) {
        warnings.push(PipelineWarning::ResolutionMismatch {
            record: (params.width, params.height),
            video: (w, h),
        });
    }
    let table = RemapTable::from_model(&params.to_model(), w, h, config.zoom);
    let out = remap_image(&rgb, &table, config.interpolation, config.border);
    out.save(&args.out)?;
    tracing::info!("Corrected image written to {}", args.out.display());
    Ok(RunStatus::from_warnings(&warnings))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let outcome = match &cli.command {
        Commands::Undistort(args) => run_undistort(args),
        Commands::Calibrate(args) => run_calibrate(args),
        Commands::RemapImage(args) => run_remap_image(args),
    };
    let status = outcome.unwrap_or_else(|e| RunStatus::Failure(e.to_string()));
    println!("{status}");
    if status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

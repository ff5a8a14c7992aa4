use serde::Serialize;

use crate::self_undistort::{EstimateError, SelfUndistortResult};
use crate::video::{VideoError, VideoInfo};

use super::record::{CalibrationParameters, RecordError};

/// Non-fatal condition met during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// Fewer segments than the configured minimum; the estimate is weak.
    InsufficientEvidence { segments: usize, min_segments: usize },
    /// The loaded record was made for another resolution. Used as-is.
    ResolutionMismatch {
        record: (u32, u32),
        video: (u32, u32),
    },
    /// A helper program was not found on `PATH`.
    ExternalToolUnavailable { tool: String },
    /// The source has no frame count; sampling was planned for `planned`
    /// frames (counted by decoding, or assumed when counting failed).
    UnreliableFrameCount { planned: usize },
    /// Sample frames that could not be read.
    SkippedSampleFrames { count: usize },
    /// Written frames differ from the count the source reported.
    FrameCountMismatch { reported: usize, written: usize },
    /// The remux command failed; the output has no audio.
    AudioRemuxFailed { reason: String },
    /// Audio copy was requested for an input/output pair that cannot carry it.
    AudioNotSupported { reason: String },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientEvidence {
                segments,
                min_segments,
            } => write!(
                f,
                "only {segments} line segments found (wanted at least {min_segments}); \
                 the estimate may be unreliable"
            ),
            Self::ResolutionMismatch { record, video } => write!(
                f,
                "calibration record is for {}x{} but the video is {}x{}; using it as-is",
                record.0, record.1, video.0, video.1
            ),
            Self::ExternalToolUnavailable { tool } => {
                write!(f, "`{tool}` not found on PATH; output kept without audio")
            }
            Self::UnreliableFrameCount { planned } => write!(
                f,
                "source reports no frame count; sampling planned for {planned} frames"
            ),
            Self::SkippedSampleFrames { count } => {
                write!(f, "{count} sample frames could not be read")
            }
            Self::FrameCountMismatch { reported, written } => write!(
                f,
                "source reported {reported} frames but {written} were written"
            ),
            Self::AudioRemuxFailed { reason } => {
                write!(f, "audio remux failed ({reason}); output kept without audio")
            }
            Self::AudioNotSupported { reason } => write!(f, "audio not copied: {reason}"),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Stream properties (fps after the default fallback).
    pub source: VideoInfo,
    /// Full-resolution calibration that was applied.
    pub params: CalibrationParameters,
    /// Estimation details; `None` when a record was loaded.
    pub estimate: Option<SelfUndistortResult>,
    pub frames_written: usize,
    /// Output pixels whose source lay outside the model's valid domain.
    pub clamped_pixels: usize,
    pub warnings: Vec<PipelineWarning>,
}

/// Result of an estimation-only run.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub source: VideoInfo,
    pub params: CalibrationParameters,
    pub estimate: SelfUndistortResult,
    pub warnings: Vec<PipelineWarning>,
}

// ── Errors ─────────────────────────────────────────────────────────────────

/// Fatal pipeline failure.
#[derive(Debug)]
pub enum PipelineError {
    /// Opening or reading the source.
    Input(VideoError),
    /// Creating or writing the sink.
    Output(VideoError),
    /// Loading or saving a calibration record.
    Calibration(RecordError),
    /// Estimation had nothing to work with.
    Estimate(EstimateError),
    /// The abort flag was raised.
    Aborted { frames_written: usize },
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input(e) => write!(f, "input error: {e}"),
            Self::Output(e) => write!(f, "output error: {e}"),
            Self::Calibration(e) => write!(f, "{e}"),
            Self::Estimate(e) => write!(f, "estimation failed: {e}"),
            Self::Aborted { frames_written } => {
                write!(f, "aborted after {frames_written} frames")
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Input(e) | Self::Output(e) => Some(e),
            Self::Calibration(e) => Some(e),
            Self::Estimate(e) => Some(e),
            Self::Aborted { .. } => None,
        }
    }
}

impl From<RecordError> for PipelineError {
    fn from(e: RecordError) -> Self {
        Self::Calibration(e)
    }
}

impl From<EstimateError> for PipelineError {
    fn from(e: EstimateError) -> Self {
        Self::Estimate(e)
    }
}

// ── Status ─────────────────────────────────────────────────────────────────

/// Overall outcome of a run, as printed by the CLI.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Success,
    SuccessWithWarnings(Vec<String>),
    Failure(String),
}

impl RunStatus {
    pub fn from_result(result: &Result<PipelineReport, PipelineError>) -> Self {
        match result {
            Ok(report) => Self::from_warnings(&report.warnings),
            Err(e) => Self::Failure(e.to_string()),
        }
    }

    /// Status of a run that completed with `warnings`.
    pub fn from_warnings(warnings: &[PipelineWarning]) -> Self {
        if warnings.is_empty() {
            Self::Success
        } else {
            Self::SuccessWithWarnings(warnings.iter().map(|w| w.to_string()).collect())
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::SuccessWithWarnings(warnings) => {
                write!(f, "success-with-warnings")?;
                for w in warnings {
                    write!(f, "\n  - {w}")?;
                }
                Ok(())
            }
            Self::Failure(diagnostic) => write!(f, "failure: {diagnostic}"),
        }
    }
}

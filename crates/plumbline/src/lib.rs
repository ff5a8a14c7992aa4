//! plumbline — self-calibrating lens-distortion correction for video.
//!
//! Fits a one-parameter radial division model to uncalibrated footage by
//! making detected lines straight again (plumb-line calibration), then
//! remaps every frame through the estimated model. The stages are:
//!
//! 1. **Lines** – per-frame detection of long straight edge segments
//!    (LSD-style region growing or Canny + probabilistic Hough).
//! 2. **Estimate** – coarse-to-fine λ grid search over a line objective with
//!    optional principal-point refinement.
//! 3. **Model** – forward/inverse division mapping and remap tables.
//! 4. **Pipeline** – frame sampling, estimation or record loading, streaming
//!    remap of the whole video, optional audio remux.
//!
//! # Public API
//! - [`process_video`] and [`run_pipeline`] as primary entry points
//! - [`PipelineConfig`] for tuning, [`CalibrationParameters`] for records
//! - [`DivisionModel`], [`PixelMapper`] and remap helpers for single images
//! - [`extract_segments`] and [`estimate_self_undistort`] for custom flows

pub mod lines;
pub mod pipeline;
pub mod pixelmap;
pub mod self_undistort;
pub mod video;

#[cfg(test)]
pub(crate) mod test_utils;

pub use lines::{
    extract_segments, ExtractConfig, HoughConfig, LineDetector, LineSegment, LsdConfig,
    SegmentAccumulator,
};
pub use pipeline::{
    process_video, run_pipeline, AbortFlag, CalibrationParameters, PipelineConfig, PipelineError,
    PipelineReport, PipelineWarning, RecordError, RunStatus,
};
pub use pixelmap::{
    build_remap, remap_image, BorderMode, DivisionModel, Interpolation, NormalizationRadius,
    PixelMapper, RemapTable,
};
pub use self_undistort::{
    estimate_self_undistort, EstimateError, LineEvidence, ObjectiveKind, SelfUndistortConfig,
    SelfUndistortResult,
};
pub use video::{FrameSink, FrameSource, VideoError, VideoInfo};

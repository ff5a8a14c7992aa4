//! End-to-end correction of a frame stream.
//!
//! [`run_pipeline`] works on any [`FrameSource`](crate::FrameSource) /
//! [`FrameSink`](crate::FrameSink) pair: it samples frames, extracts line
//! evidence at a reduced working width, estimates (or loads) the division
//! model, lifts it to the source resolution and streams every frame through
//! one precomputed remap table. [`process_video`] adds path dispatch and the
//! optional audio remux.

mod abort;
pub mod audio;
mod config;
mod record;
mod report;
mod run;

pub use abort::AbortFlag;
pub use config::{ConfigError, PipelineConfig, SAMPLE_FRAMES_HARD_CAP};
pub use record::{CalibrationParameters, RecordError};
pub use report::{
    CalibrationReport, PipelineError, PipelineReport, PipelineWarning, RunStatus,
};
pub use run::{calibrate_source, downscale_size, process_video, run_pipeline};

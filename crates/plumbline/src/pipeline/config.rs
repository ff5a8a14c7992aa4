use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::lines::ExtractConfig;
use crate::pixelmap::{BorderMode, Interpolation};
use crate::self_undistort::SelfUndistortConfig;

/// Upper bound on sampled frames regardless of configuration.
pub const SAMPLE_FRAMES_HARD_CAP: usize = 50;

/// Configuration of a full correction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames sampled for calibration.
    pub sample_frames: usize,
    /// Cap on `sample_frames` (itself capped at 50).
    pub max_sample_frames: usize,
    /// Fraction of the video skipped at each end when sampling.
    pub margin_ratio: f64,
    /// Frame count used for sample planning when the container has none
    /// and counting its frames fails.
    pub assumed_frame_count: usize,
    /// Width frames are downscaled to for estimation (never upscaled).
    pub downscale_width: u32,
    /// Frame rate used when the source reports none.
    pub default_fps: f64,
    /// Line detection and filtering.
    pub extract: ExtractConfig,
    /// λ / principal-point search.
    pub estimate: SelfUndistortConfig,
    /// Output field-of-view scale (`> 1` crops).
    pub zoom: f64,
    /// Remap interpolation.
    pub interpolation: Interpolation,
    /// Remap border policy.
    pub border: BorderMode,
    /// Encoder name for video file outputs.
    pub output_codec: String,
    /// Copy the source audio into the output with an external `ffmpeg`.
    pub copy_audio: bool,
    /// Load this calibration record instead of estimating.
    pub calibration_in: Option<PathBuf>,
    /// Save the estimated calibration record here.
    pub calibration_out: Option<PathBuf>,
    /// Write segment overlays of the sampled frames into this directory.
    pub overlay_dir: Option<PathBuf>,
    /// Log progress every this many frames (`0` disables).
    pub progress_every: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_frames: 12,
            max_sample_frames: SAMPLE_FRAMES_HARD_CAP,
            margin_ratio: 0.1,
            assumed_frame_count: 300,
            downscale_width: 640,
            default_fps: 30.0,
            extract: ExtractConfig::default(),
            estimate: SelfUndistortConfig::default(),
            zoom: 1.0,
            interpolation: Interpolation::Bilinear,
            border: BorderMode::Constant(0),
            output_codec: "mpeg4".to_string(),
            copy_audio: false,
            calibration_in: None,
            calibration_out: None,
            overlay_dir: None,
            progress_every: 100,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Number of frames to sample after applying both caps.
    pub fn effective_sample_frames(&self) -> usize {
        self.sample_frames
            .min(self.max_sample_frames)
            .min(SAMPLE_FRAMES_HARD_CAP)
    }
}

/// Configuration file could not be loaded.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config {}: {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "malformed config {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::LineDetector;
    use crate::self_undistort::ObjectiveKind;

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(
            &path,
            r#"{
                "sample_frames": 20,
                "border": "replicate",
                "estimate": {"objective": "line_length", "lambda_range": [-0.6, 0.6]},
                "extract": {"detector": {"kind": "hough", "threshold": 80}}
            }"#,
        )
        .unwrap();
        let cfg = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.sample_frames, 20);
        assert_eq!(cfg.border, BorderMode::Replicate);
        assert_eq!(cfg.estimate.objective, ObjectiveKind::LineLength);
        assert_eq!(cfg.estimate.lambda_range, [-0.6, 0.6]);
        assert_eq!(cfg.estimate.grid_points, 41);
        match &cfg.extract.detector {
            LineDetector::Hough(h) => {
                assert_eq!(h.threshold, 80);
                assert_eq!(h.max_line_gap, 10.0);
            }
            other => panic!("unexpected detector {other:?}"),
        }
        assert_eq!(cfg.downscale_width, 640);
        assert_eq!(cfg.output_codec, "mpeg4");
    }

    #[test]
    fn constant_border_value_parses() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"border": {"constant": 255}}"#).unwrap();
        assert_eq!(cfg.border, BorderMode::Constant(255));
    }

    #[test]
    fn malformed_json_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = PipelineConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn sample_frames_are_hard_capped() {
        let cfg = PipelineConfig {
            sample_frames: 500,
            max_sample_frames: 400,
            ..PipelineConfig::default()
        };
        assert_eq!(cfg.effective_sample_frames(), 50);
        assert_eq!(PipelineConfig::default().effective_sample_frames(), 12);
    }
}

//! Calibration records: the estimated model at the video's full resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pixelmap::{DivisionModel, NormalizationRadius};

/// Persisted calibration of one video resolution.
///
/// ```json
/// { "width": 1920, "height": 1080, "cx": 960.0, "cy": 540.0,
///   "lambda": -0.12, "scale_norm": 1920.0 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    pub width: u32,
    pub height: u32,
    pub cx: f64,
    pub cy: f64,
    pub lambda: f64,
    pub scale_norm: f64,
}

/// On-disk shape; `scale_norm` may be omitted.
#[derive(Deserialize)]
struct RecordFile {
    width: u32,
    height: u32,
    cx: f64,
    cy: f64,
    lambda: f64,
    #[serde(default)]
    scale_norm: Option<f64>,
}

impl CalibrationParameters {
    /// Record for `model` at a `width × height` resolution.
    pub fn from_model(model: &DivisionModel, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cx: model.cx,
            cy: model.cy,
            lambda: model.lambda,
            scale_norm: model.scale_norm,
        }
    }

    pub fn to_model(&self) -> DivisionModel {
        DivisionModel::new(self.lambda, self.cx, self.cy, self.scale_norm)
    }

    /// Move a model estimated on a `from`-sized image to `width × height`.
    ///
    /// The principal point scales by the width ratio. `scale_norm` is
    /// recomputed with `norm` for the target resolution, which keeps λ valid
    /// because it acts on normalized radii.
    pub fn lift(
        model: &DivisionModel,
        from: (u32, u32),
        width: u32,
        height: u32,
        norm: NormalizationRadius,
    ) -> Self {
        let ratio = if from.0 > 0 {
            width as f64 / from.0 as f64
        } else {
            1.0
        };
        Self {
            width,
            height,
            cx: model.cx * ratio,
            cy: model.cy * ratio,
            lambda: model.lambda,
            scale_norm: norm.radius(width, height),
        }
    }

    /// Check the record invariants.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.width == 0 || self.height == 0 {
            return Err(RecordError::Invalid(format!(
                "resolution {}x{} is empty",
                self.width, self.height
            )));
        }
        if !(self.cx.is_finite() && self.cy.is_finite()) {
            return Err(RecordError::Invalid(
                "principal point is not finite".to_string(),
            ));
        }
        if !self.lambda.is_finite() {
            return Err(RecordError::Invalid("lambda is not finite".to_string()));
        }
        if !self.scale_norm.is_finite() || self.scale_norm <= 0.0 {
            return Err(RecordError::Invalid(format!(
                "scale_norm must be positive, got {}",
                self.scale_norm
            )));
        }
        Ok(())
    }

    /// Load and validate a record. A missing `scale_norm` is derived from
    /// the record's resolution with `norm`.
    pub fn load_json(path: &Path, norm: NormalizationRadius) -> Result<Self, RecordError> {
        let text = std::fs::read_to_string(path).map_err(|e| RecordError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let raw: RecordFile = serde_json::from_str(&text).map_err(|e| RecordError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        let params = Self {
            width: raw.width,
            height: raw.height,
            cx: raw.cx,
            cy: raw.cy,
            lambda: raw.lambda,
            scale_norm: raw
                .scale_norm
                .unwrap_or_else(|| norm.radius(raw.width, raw.height)),
        };
        params.validate()?;
        Ok(params)
    }

    /// Write the record as pretty-printed JSON, creating parent directories.
    pub fn save_json(&self, path: &Path) -> Result<(), RecordError> {
        let io_err = |e: std::io::Error| RecordError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| RecordError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(io_err)
    }
}

// ── Errors ─────────────────────────────────────────────────────────────────

/// Calibration record could not be read, written or trusted.
#[derive(Debug)]
pub enum RecordError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Parsed but violates a record invariant.
    Invalid(String),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "calibration record {}: {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "malformed calibration record {}: {source}", path.display())
            }
            Self::Invalid(reason) => write!(f, "invalid calibration record: {reason}"),
        }
    }
}

impl std::error::Error for RecordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> CalibrationParameters {
        CalibrationParameters {
            width: 1920,
            height: 1080,
            cx: 955.5,
            cy: 541.25,
            lambda: -0.125,
            scale_norm: 1920.0,
        }
    }

    #[test]
    fn json_roundtrip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("calib.json");
        sample().save_json(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'), "record should be pretty-printed");
        let back = CalibrationParameters::load_json(&path, NormalizationRadius::MaxDimension)
            .unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn missing_scale_norm_is_derived() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calib.json");
        std::fs::write(
            &path,
            r#"{"width": 640, "height": 480, "cx": 320, "cy": 240, "lambda": 0.1}"#,
        )
        .unwrap();
        let p = CalibrationParameters::load_json(&path, NormalizationRadius::MaxDimension).unwrap();
        assert_relative_eq!(p.scale_norm, 640.0);
        let p = CalibrationParameters::load_json(&path, NormalizationRadius::HalfDiagonal).unwrap();
        assert_relative_eq!(p.scale_norm, 400.0);
    }

    #[test]
    fn invalid_records_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calib.json");
        std::fs::write(
            &path,
            r#"{"width": 0, "height": 480, "cx": 0, "cy": 240, "lambda": 0.1}"#,
        )
        .unwrap();
        assert!(matches!(
            CalibrationParameters::load_json(&path, NormalizationRadius::MaxDimension),
            Err(RecordError::Invalid(_))
        ));

        std::fs::write(&path, r#"{"width": 640}"#).unwrap();
        assert!(matches!(
            CalibrationParameters::load_json(&path, NormalizationRadius::MaxDimension),
            Err(RecordError::Json { .. })
        ));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            CalibrationParameters::load_json(&missing, NormalizationRadius::MaxDimension),
            Err(RecordError::Io { .. })
        ));

        let bad = CalibrationParameters {
            scale_norm: -1.0,
            ..sample()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn lift_scales_center_and_renormalizes() {
        let small = DivisionModel::new(0.2, 321.0, 179.5, 640.0);
        let p = CalibrationParameters::lift(
            &small,
            (640, 360),
            1920,
            1080,
            NormalizationRadius::MaxDimension,
        );
        assert_relative_eq!(p.cx, 963.0);
        assert_relative_eq!(p.cy, 538.5);
        assert_relative_eq!(p.scale_norm, 1920.0);
        assert_relative_eq!(p.lambda, 0.2);

        // normalized radius of corresponding points is unchanged
        let full = p.to_model();
        let small_pt = [600.0, 50.0];
        let full_pt = [600.0 * 3.0, 50.0 * 3.0];
        let r_small = ((small_pt[0] - small.cx).powi(2) + (small_pt[1] - small.cy).powi(2))
            .sqrt()
            / small.scale_norm;
        let r_full = ((full_pt[0] - full.cx).powi(2) + (full_pt[1] - full.cy).powi(2)).sqrt()
            / full.scale_norm;
        assert_relative_eq!(r_small, r_full, epsilon = 1e-12);
    }
}

//! Copying the source audio track into the corrected video.
//!
//! The corrected frames are first encoded into a silent temporary file. An
//! external `ffmpeg` then muxes that video stream with the source's audio.
//! Every failure degrades to keeping the silent video.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::report::PipelineWarning;

const FFMPEG: &str = "ffmpeg";

/// Locate an executable by name on `PATH`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// `<dir>/<stem>_silent.<ext>` next to `output`.
pub fn silent_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!("{stem}_silent.{}", ext.to_string_lossy()),
        None => format!("{stem}_silent"),
    };
    output.with_file_name(name)
}

/// Mux `silent`'s video with `source`'s audio into `output` using the
/// `ffmpeg` found on `PATH`.
pub fn remux_audio(source: &Path, silent: &Path, output: &Path) -> Vec<PipelineWarning> {
    remux_audio_with(find_executable(FFMPEG).as_deref(), source, silent, output)
}

/// Same as [`remux_audio`] with an explicit tool (`None` = unavailable).
pub fn remux_audio_with(
    tool: Option<&Path>,
    source: &Path,
    silent: &Path,
    output: &Path,
) -> Vec<PipelineWarning> {
    let mut warnings = Vec::new();
    let Some(tool) = tool else {
        tracing::warn!("{} not found on PATH; writing video without audio", FFMPEG);
        warnings.push(PipelineWarning::ExternalToolUnavailable {
            tool: FFMPEG.to_string(),
        });
        keep_silent(silent, output, &mut warnings);
        return warnings;
    };

    let status = Command::new(tool)
        .arg("-y")
        .arg("-i")
        .arg(source)
        .arg("-i")
        .arg(silent)
        .args(["-c", "copy", "-map", "1:v:0", "-map", "0:a?", "-shortest"])
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(s) if s.success() => {
            if let Err(e) = std::fs::remove_file(silent) {
                tracing::debug!("could not remove {}: {}", silent.display(), e);
            }
            tracing::info!("audio copied into {}", output.display());
        }
        Ok(s) => {
            let reason = format!("{} exited with {s}", tool.display());
            tracing::warn!("audio remux failed: {}", reason);
            warnings.push(PipelineWarning::AudioRemuxFailed { reason });
            keep_silent(silent, output, &mut warnings);
        }
        Err(e) => {
            let reason = format!("could not run {}: {e}", tool.display());
            tracing::warn!("audio remux failed: {}", reason);
            warnings.push(PipelineWarning::AudioRemuxFailed { reason });
            keep_silent(silent, output, &mut warnings);
        }
    }
    warnings
}

/// Move the silent video to `output`, copying when a rename is impossible.
fn keep_silent(silent: &Path, output: &Path, warnings: &mut Vec<PipelineWarning>) {
    let moved = std::fs::rename(silent, output).or_else(|_| {
        std::fs::copy(silent, output)?;
        std::fs::remove_file(silent)
    });
    if let Err(e) = moved {
        tracing::warn!(
            "could not move {} to {}: {}",
            silent.display(),
            output.display(),
            e
        );
        warnings.push(PipelineWarning::AudioRemuxFailed {
            reason: format!("silent output left at {}: {e}", silent.display()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_path_keeps_extension() {
        assert_eq!(
            silent_path(Path::new("/tmp/out/clip.mp4")),
            PathBuf::from("/tmp/out/clip_silent.mp4")
        );
        assert_eq!(
            silent_path(Path::new("clip")),
            PathBuf::from("clip_silent")
        );
    }

    #[test]
    fn missing_tool_keeps_silent_video() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.mp4");
        let output = dir.path().join("out.mp4");
        let silent = silent_path(&output);
        std::fs::write(&silent, b"video").unwrap();

        let warnings = remux_audio_with(None, &source, &silent, &output);
        assert_eq!(
            warnings,
            vec![PipelineWarning::ExternalToolUnavailable {
                tool: "ffmpeg".to_string()
            }]
        );
        assert_eq!(std::fs::read(&output).unwrap(), b"video");
        assert!(!silent.exists());
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_keeps_silent_video() {
        let Some(tool) = find_executable("false") else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.mp4");
        let output = dir.path().join("out.mp4");
        let silent = silent_path(&output);
        std::fs::write(&silent, b"video").unwrap();

        let warnings = remux_audio_with(Some(tool.as_path()), &source, &silent, &output);
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            warnings[0],
            PipelineWarning::AudioRemuxFailed { .. }
        ));
        assert_eq!(std::fs::read(&output).unwrap(), b"video");
    }

    #[cfg(unix)]
    #[test]
    fn successful_tool_removes_silent_video() {
        let Some(tool) = find_executable("true") else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let silent = silent_path(&output);
        std::fs::write(&silent, b"video").unwrap();

        let source = dir.path().join("in.mp4");
        let warnings = remux_audio_with(Some(tool.as_path()), &source, &silent, &output);
        assert!(warnings.is_empty());
        assert!(!silent.exists());
    }

    #[test]
    fn unknown_executable_is_not_found() {
        assert!(find_executable("plumbline-no-such-tool-7f3a").is_none());
    }
}

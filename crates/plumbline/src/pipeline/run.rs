use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::lines::{extract_segments, write_overlay, SegmentAccumulator};
use crate::pixelmap::{remap_image, RemapTable};
use crate::self_undistort::{
    estimate_self_undistort, LineEvidence, ObjectiveKind, SelfUndistortResult,
};
use crate::video::{
    self, count_frames, pick_sample_indices, read_sample_frames, FrameSink, FrameSource,
    VideoError, VideoInfo,
};

use super::abort::AbortFlag;
use super::audio;
use super::config::PipelineConfig;
use super::record::CalibrationParameters;
use super::report::{CalibrationReport, PipelineError, PipelineReport, PipelineWarning};

/// Estimation working size: `target_width` wide with the aspect ratio kept.
///
/// Frames narrower than the target (or `target_width == 0`) keep their size.
pub fn downscale_size(width: u32, height: u32, target_width: u32) -> (u32, u32) {
    if target_width == 0 || width <= target_width {
        return (width, height);
    }
    let h = (height as f64 * target_width as f64 / width as f64)
        .round()
        .max(1.0) as u32;
    (target_width, h)
}

fn downscale(frame: &RgbImage, size: (u32, u32)) -> RgbImage {
    if frame.dimensions() == size {
        return frame.clone();
    }
    imageops::resize(frame, size.0, size.1, FilterType::Triangle)
}

/// Source info with an unusable frame rate replaced by `default_fps`.
fn stream_info(mut info: VideoInfo, default_fps: f64) -> VideoInfo {
    if !(info.fps.is_finite() && info.fps > 0.0) {
        tracing::warn!(
            "source reports fps {}; using {}",
            info.fps,
            default_fps
        );
        info.fps = default_fps;
    }
    info
}

fn checked_info(
    source: &dyn FrameSource,
    config: &PipelineConfig,
) -> Result<VideoInfo, PipelineError> {
    let info = stream_info(source.info(), config.default_fps);
    if info.width == 0 || info.height == 0 {
        return Err(PipelineError::Input(VideoError::Backend(
            "source reports an empty frame size".to_string(),
        )));
    }
    Ok(info)
}

fn load_calibration(
    path: &Path,
    info: &VideoInfo,
    config: &PipelineConfig,
    warnings: &mut Vec<PipelineWarning>,
) -> Result<CalibrationParameters, PipelineError> {
    let params = CalibrationParameters::load_json(path, config.estimate.normalization)?;
    tracing::info!(
        "loaded calibration {}: lambda={:.6} center=({:.1}, {:.1})",
        path.display(),
        params.lambda,
        params.cx,
        params.cy
    );
    if (params.width, params.height) != (info.width, info.height) {
        tracing::warn!(
            "calibration is for {}x{}, video is {}x{}; applying it unchanged",
            params.width,
            params.height,
            info.width,
            info.height
        );
        warnings.push(PipelineWarning::ResolutionMismatch {
            record: (params.width, params.height),
            video: (info.width, info.height),
        });
    }
    Ok(params)
}

/// Sample, detect and estimate; returns the model lifted to full resolution.
fn calibrate(
    source: &mut dyn FrameSource,
    info: &VideoInfo,
    config: &PipelineConfig,
    abort: &AbortFlag,
    warnings: &mut Vec<PipelineWarning>,
) -> Result<(CalibrationParameters, SelfUndistortResult), PipelineError> {
    let planned = match info.frame_count {
        Some(n) => n,
        None => {
            let planned = match count_frames(source) {
                Ok(n) => {
                    tracing::warn!("frame count unavailable; counted {} frames", n);
                    n
                }
                Err(e) => {
                    tracing::warn!(
                        "frame count unavailable, counting failed ({}); assuming {} frames",
                        e,
                        config.assumed_frame_count
                    );
                    config.assumed_frame_count
                }
            };
            warnings.push(PipelineWarning::UnreliableFrameCount { planned });
            planned
        }
    };
    let indices = pick_sample_indices(
        planned,
        config.effective_sample_frames(),
        config.margin_ratio,
    );
    tracing::info!("sampling {} of {} frames", indices.len(), planned);

    let sampled = read_sample_frames(source, &indices).map_err(PipelineError::Input)?;
    if sampled.skipped > 0 {
        warnings.push(PipelineWarning::SkippedSampleFrames {
            count: sampled.skipped,
        });
    }

    let work = downscale_size(info.width, info.height, config.downscale_width);
    let keep_frames = config.estimate.objective == ObjectiveKind::LineLength;
    let mut accumulator = SegmentAccumulator::new(config.extract.max_total);
    let mut gray_frames = Vec::new();
    let mut frames_used = 0usize;

    for (index, frame) in &sampled.frames {
        if abort.is_raised() {
            return Err(PipelineError::Aborted { frames_written: 0 });
        }
        let small = downscale(frame, work);
        let gray = imageops::grayscale(&small);
        let segments = extract_segments(&gray, &config.extract);
        tracing::debug!("sample frame {}: {} segments", index, segments.len());

        if let Some(dir) = &config.overlay_dir {
            if let Err(e) = write_overlay(dir, *index, &small, &segments) {
                tracing::warn!("could not write overlay for frame {}: {}", index, e);
            }
        }
        if keep_frames {
            gray_frames.push(gray);
        }
        frames_used += 1;
        accumulator.push(segments);
        if accumulator.is_full() && !keep_frames {
            tracing::debug!("segment cap {} reached", config.extract.max_total);
            break;
        }
    }

    let n_frames = frames_used;
    let evidence = LineEvidence {
        segments: accumulator.finish(),
        frames: gray_frames,
        n_frames,
    };
    tracing::info!(
        "collected {} segments from {} frames at {}x{}",
        evidence.segments.len(),
        evidence.n_frames,
        work.0,
        work.1
    );

    let result = estimate_self_undistort(&evidence, [work.0, work.1], &config.estimate)?;
    if result.low_evidence {
        tracing::warn!(
            "low line evidence ({} segments); estimate may be unreliable",
            result.n_segments
        );
        warnings.push(PipelineWarning::InsufficientEvidence {
            segments: result.n_segments,
            min_segments: config.estimate.min_segments,
        });
    }

    let params = CalibrationParameters::lift(
        &result.model,
        work,
        info.width,
        info.height,
        config.estimate.normalization,
    );
    tracing::info!(
        "estimated lambda={:.6} center=({:.1}, {:.1}) at {}x{}",
        params.lambda,
        params.cx,
        params.cy,
        params.width,
        params.height
    );
    Ok((params, result))
}

/// Estimate the calibration of `source` without remapping any frame.
pub fn calibrate_source(
    source: &mut dyn FrameSource,
    config: &PipelineConfig,
    abort: &AbortFlag,
) -> Result<CalibrationReport, PipelineError> {
    let info = checked_info(source, config)?;
    let mut warnings = Vec::new();
    let (params, estimate) = calibrate(source, &info, config, abort, &mut warnings)?;
    if let Some(out) = &config.calibration_out {
        params.save_json(out)?;
        tracing::info!("saved calibration to {}", out.display());
    }
    Ok(CalibrationReport {
        source: info,
        params,
        estimate,
        warnings,
    })
}

/// Run the full correction over `source`, writing every remapped frame to
/// `sink` in order.
///
/// With `calibration_in` set the record is applied as-is; otherwise the
/// model is estimated from sampled frames at `downscale_width` and lifted
/// to the source resolution. The abort flag is checked between frames.
pub fn run_pipeline(
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    config: &PipelineConfig,
    abort: &AbortFlag,
) -> Result<PipelineReport, PipelineError> {
    let info = checked_info(source, config)?;

    let mut warnings = Vec::new();
    let (params, estimate) = match &config.calibration_in {
        Some(path) => (load_calibration(path, &info, config, &mut warnings)?, None),
        None => {
            let calibration = calibrate_source(source, config, abort)?;
            warnings.extend(calibration.warnings);
            (calibration.params, Some(calibration.estimate))
        }
    };

    let table = RemapTable::from_model(&params.to_model(), info.width, info.height, config.zoom);
    if table.clamped() > 0 {
        tracing::warn!(
            "{} output pixels fall outside the model domain and map to themselves",
            table.clamped()
        );
    }

    source.rewind().map_err(PipelineError::Input)?;
    let mut frames_written = 0usize;
    loop {
        if abort.is_raised() {
            tracing::warn!("abort requested after {} frames", frames_written);
            if let Err(e) = sink.finish() {
                tracing::debug!("could not finalize partial output: {}", e);
            }
            return Err(PipelineError::Aborted { frames_written });
        }
        let Some(frame) = source.next_frame().map_err(PipelineError::Input)? else {
            break;
        };
        let corrected = remap_image(&frame, &table, config.interpolation, config.border);
        sink.write_frame(&corrected).map_err(PipelineError::Output)?;
        frames_written += 1;
        if config.progress_every > 0 && frames_written % config.progress_every == 0 {
            match info.frame_count {
                Some(total) => tracing::info!("processed {}/{} frames", frames_written, total),
                None => tracing::info!("processed {} frames", frames_written),
            }
        }
    }
    sink.finish().map_err(PipelineError::Output)?;
    tracing::info!("wrote {} frames", frames_written);

    if let Some(reported) = info.frame_count {
        if reported != frames_written {
            warnings.push(PipelineWarning::FrameCountMismatch {
                reported,
                written: frames_written,
            });
        }
    }

    Ok(PipelineReport {
        source: info,
        params,
        estimate,
        frames_written,
        clamped_pixels: table.clamped(),
        warnings,
    })
}

/// Correct the video at `input` and write it to `output`.
///
/// Paths are dispatched by [`video::open_source`] / [`video::create_sink`].
/// With `copy_audio` the frames go to a temporary `<stem>_silent.<ext>`
/// which is then muxed with the source audio; remux problems are warnings.
pub fn process_video(
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
    abort: &AbortFlag,
) -> Result<PipelineReport, PipelineError> {
    let mut source = video::open_source(input, config.default_fps).map_err(PipelineError::Input)?;
    let info = stream_info(source.info(), config.default_fps);

    let mut audio_warnings = Vec::new();
    let silent = if !config.copy_audio {
        None
    } else if input.is_dir() || video::is_sequence_path(output) {
        audio_warnings.push(PipelineWarning::AudioNotSupported {
            reason: "image sequences carry no audio".to_string(),
        });
        None
    } else {
        Some(audio::silent_path(output))
    };

    let target = silent.as_deref().unwrap_or(output);
    let mut sink =
        video::create_sink(target, &info, &config.output_codec).map_err(PipelineError::Output)?;
    let result = run_pipeline(source.as_mut(), sink.as_mut(), config, abort);
    drop(sink);
    drop(source);

    let mut report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Some(silent) = &silent {
                if let Err(rm) = std::fs::remove_file(silent) {
                    tracing::debug!("could not remove {}: {}", silent.display(), rm);
                }
            }
            return Err(e);
        }
    };
    report.warnings.extend(audio_warnings);
    if let Some(silent) = &silent {
        report
            .warnings
            .extend(audio::remux_audio(input, silent, output));
    }
    Ok(report)
}

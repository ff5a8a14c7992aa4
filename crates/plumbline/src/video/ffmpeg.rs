//! Video containers through FFmpeg (`ffmpeg` feature).
//!
//! Decoded frames are converted to RGB24; encoded frames are converted from
//! RGB24 to YUV420P for the chosen encoder. The source does not seek: frame
//! accurate seeking depends on the container's keyframe layout, so sample
//! frames are read sequentially instead.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use image::RgbImage;

use super::{check_size, FrameSink, FrameSource, VideoError, VideoInfo};

fn backend<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> VideoError + '_ {
    move |e| VideoError::Backend(format!("{context}: {e}"))
}

fn init() -> Result<(), VideoError> {
    ffmpeg::init().map_err(backend("initialize ffmpeg"))
}

/// Decoder for the best video stream of a container.
pub struct FfmpegSource {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    info: VideoInfo,
    eof_sent: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> Result<Self, VideoError> {
        init()?;
        let input = ffmpeg::format::input(&path).map_err(backend("open input"))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| VideoError::Backend(format!("{} has no video track", path.display())))?;
        let stream_index = stream.index();
        let fps = f64::from(stream.avg_frame_rate());
        let frame_count = usize::try_from(stream.frames()).ok().filter(|&n| n > 0);
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(backend("load decoder parameters"))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(backend("open video decoder"))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(backend("create scaler"))?;

        let info = VideoInfo {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            frame_count,
        };
        tracing::info!(
            "opened {}: {}x{} @ {:.3} fps, {} frames",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.frame_count
                .map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            stream_index,
            decoder,
            scaler,
            info,
            eof_sent: false,
        })
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<RgbImage, VideoError> {
        let mut rgb = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb)
            .map_err(backend("scale frame to RGB"))?;
        frame_to_image(&rgb)
    }
}

fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage, VideoError> {
    let (width, height) = (frame.width(), frame.height());
    let row_bytes = width as usize * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let bytes = data
            .get(start..start + row_bytes)
            .ok_or_else(|| VideoError::Backend("frame row is out of bounds".to_string()))?;
        pixels.extend_from_slice(bytes);
    }
    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| VideoError::Backend("frame buffer size mismatch".to_string()))
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }
            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .map_err(backend("send packet to decoder"))?;
                }
                None => {
                    self.decoder
                        .send_eof()
                        .map_err(backend("flush decoder"))?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn rewind(&mut self) -> Result<(), VideoError> {
        let path = self.path.clone();
        *self = Self::open(&path)?;
        Ok(())
    }
}

/// Encoder writing one video stream into a container.
pub struct FfmpegSink {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    size: (u32, u32),
    next_pts: i64,
}

impl FfmpegSink {
    /// Create `path` with the encoder named `codec` (e.g. `mpeg4`).
    pub fn create(path: &Path, info: &VideoInfo, codec: &str) -> Result<Self, VideoError> {
        init()?;
        let mut output = ffmpeg::format::output(&path).map_err(backend("create output"))?;
        let codec_handle = ffmpeg::encoder::find_by_name(codec)
            .ok_or_else(|| VideoError::Backend(format!("encoder '{codec}' not available")))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let fps = ffmpeg::Rational::from(info.fps);
        let time_base = fps.invert();

        let mut stream = output
            .add_stream(codec_handle)
            .map_err(backend("add output stream"))?;
        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec_handle)
            .encoder()
            .video()
            .map_err(backend("create encoder"))?;
        encoder.set_width(info.width);
        encoder.set_height(info.height);
        encoder.set_format(ffmpeg::util::format::pixel::Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(fps));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder
            .open_as(codec_handle)
            .map_err(backend("open encoder"))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        output.write_header().map_err(backend("write header"))?;
        let stream_time_base = output
            .stream(0)
            .map(|s| s.time_base())
            .ok_or_else(|| VideoError::Backend("output stream vanished".to_string()))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            ffmpeg::util::format::pixel::Pixel::RGB24,
            info.width,
            info.height,
            ffmpeg::util::format::pixel::Pixel::YUV420P,
            info.width,
            info.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(backend("create scaler"))?;

        Ok(Self {
            output,
            encoder,
            scaler,
            encoder_time_base: time_base,
            stream_time_base,
            size: (info.width, info.height),
            next_pts: 0,
        })
    }

    fn drain(&mut self) -> Result<(), VideoError> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(backend("write packet"))?;
        }
        Ok(())
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), VideoError> {
        check_size(self.size, frame)?;
        let (w, h) = self.size;
        let mut rgb = ffmpeg::frame::Video::new(ffmpeg::util::format::pixel::Pixel::RGB24, w, h);
        let stride = rgb.stride(0);
        let row_bytes = w as usize * 3;
        let data = rgb.data_mut(0);
        for (row, src) in frame.as_raw().chunks_exact(row_bytes).enumerate() {
            data[row * stride..row * stride + row_bytes].copy_from_slice(src);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .map_err(backend("scale frame to YUV"))?;
        yuv.set_pts(Some(self.next_pts));
        self.next_pts += 1;
        self.encoder
            .send_frame(&yuv)
            .map_err(backend("send frame to encoder"))?;
        self.drain()
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        self.encoder
            .send_eof()
            .map_err(backend("flush encoder"))?;
        self.drain()?;
        self.output
            .write_trailer()
            .map_err(backend("write trailer"))
    }
}

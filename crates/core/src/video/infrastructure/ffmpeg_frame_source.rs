use std::path::Path;
use std::time::Duration;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;

use crate::shared::sample_buffer::{PixelFormat, Rotation, SampleBuffer};
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::FrameSource;

/// Decodes video files via ffmpeg-next into BGRA sample buffers, the same
/// layout a camera capture session delivers.
pub struct FfmpegFrameSource {
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    video_stream_index: usize,
    time_base: ffmpeg_next::Rational,
    metadata: Option<VideoMetadata>,
}

// Safety: FfmpegFrameSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    pub fn new() -> Self {
        Self {
            input_ctx: None,
            video_stream_index: 0,
            time_base: ffmpeg_next::Rational(0, 1),
            metadata: None,
        }
    }

    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.metadata.as_ref()
    }
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx = ffmpeg_next::format::input(path)?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            total_frames: stream.frames().max(0) as usize,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
            rotation: Rotation::from_degrees(extract_rotation(&stream)),
        };
        log::info!(
            "Opened {} ({}x{} {}, {:.2} fps, {:?})",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.codec,
            metadata.fps,
            metadata.rotation
        );

        self.video_stream_index = stream.index();
        self.time_base = stream.time_base();
        self.metadata = Some(metadata.clone());
        self.input_ctx = Some(ictx);

        Ok(metadata)
    }

    fn buffers(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<SampleBuffer, Box<dyn std::error::Error>>> + '_> {
        let (Some(ictx), Some(metadata)) = (self.input_ctx.as_mut(), self.metadata.as_ref()) else {
            return Box::new(std::iter::once(Err("FfmpegFrameSource: not opened".into())));
        };

        let (decoder, scaler) = match open_decoder(ictx, self.video_stream_index) {
            Ok(parts) => parts,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };

        Box::new(BufferIter {
            ictx,
            decoder,
            scaler,
            video_stream_index: self.video_stream_index,
            time_base: self.time_base,
            fps: metadata.fps,
            rotation: metadata.rotation,
            frame_index: 0,
            flushing: false,
            done: false,
        })
    }

    fn close(&mut self) {
        self.input_ctx = None;
        self.metadata = None;
    }
}

fn open_decoder(
    ictx: &ffmpeg_next::format::context::Input,
    video_stream_index: usize,
) -> Result<(ffmpeg_next::decoder::Video, scaling::Context), Box<dyn std::error::Error>> {
    let stream = ictx
        .stream(video_stream_index)
        .ok_or("Video stream disappeared")?;
    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
    let decoder = codec_ctx.decoder().video()?;
    let scaler = scaling::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        Pixel::BGRA,
        decoder.width(),
        decoder.height(),
        scaling::Flags::BILINEAR,
    )?;
    Ok((decoder, scaler))
}

/// Decodes one frame per `next()` call.
struct BufferIter<'a> {
    ictx: &'a mut ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    video_stream_index: usize,
    time_base: ffmpeg_next::Rational,
    fps: f64,
    rotation: Rotation,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

impl BufferIter<'_> {
    fn try_receive(&mut self) -> Option<Result<SampleBuffer, Box<dyn std::error::Error>>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        self.decoder.receive_frame(&mut decoded).ok()?;

        let mut bgra = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut bgra) {
            return Some(Err(Box::new(e)));
        }

        let timestamp = self.timestamp(decoded.timestamp().or(decoded.pts()));
        self.frame_index += 1;

        let buffer = SampleBuffer::new(
            bgra.data(0).to_vec(),
            bgra.width(),
            bgra.height(),
            bgra.stride(0),
            PixelFormat::Bgra8,
        )
        .map(|b| b.with_timestamp(timestamp).with_rotation(self.rotation))
        .map_err(|e| -> Box<dyn std::error::Error> { Box::new(e) });
        Some(buffer)
    }

    /// Presentation time from the stream clock, falling back to the frame
    /// index when the container carries no timestamps.
    fn timestamp(&self, pts: Option<i64>) -> Duration {
        let tb = self.time_base;
        match pts {
            Some(pts) if pts >= 0 && tb.denominator() > 0 => Duration::from_secs_f64(
                pts as f64 * tb.numerator() as f64 / tb.denominator() as f64,
            ),
            _ if self.fps > 0.0 => Duration::from_secs_f64(self.frame_index as f64 / self.fps),
            _ => Duration::ZERO,
        }
    }
}

impl Iterator for BufferIter<'_> {
    type Item = Result<SampleBuffer, Box<dyn std::error::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(result) = self.try_receive() {
            return Some(result);
        }

        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(result) = self.try_receive() {
                    return Some(result);
                }
                self.done = true;
                return None;
            };

            if stream.index() != self.video_stream_index {
                continue;
            }

            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

/// Rotation in degrees from DisplayMatrix side data, else the `rotate` tag.
fn extract_rotation(stream: &ffmpeg_next::format::stream::Stream) -> i32 {
    for side_data in stream.side_data() {
        if side_data.kind() == ffmpeg_next::codec::packet::side_data::Type::DisplayMatrix {
            if let Some(angle) = parse_display_matrix(side_data.data()) {
                return angle;
            }
        }
    }

    stream
        .metadata()
        .get("rotate")
        .and_then(|r| r.parse::<i32>().ok())
        .unwrap_or(0)
}

/// Angle of a 3x3 16.16 fixed-point display matrix, negated since the
/// matrix describes the inverse of the recorded rotation.
fn parse_display_matrix(data: &[u8]) -> Option<i32> {
    if data.len() < 36 {
        return None;
    }

    let m00 = i32::from_le_bytes(data[0..4].try_into().ok()?) as f64 / 65536.0;
    let m10 = i32::from_le_bytes(data[4..8].try_into().ok()?) as f64 / 65536.0;

    Some(-m10.atan2(m00).to_degrees().round() as i32)
}

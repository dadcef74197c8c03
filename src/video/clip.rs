use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::{self, Pixel};
use ffmpeg::media;
use ffmpeg::software::scaling::Flags;
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::{rescale, Packet, Rational, Rescale};
use tracing::{debug, info, warn};

use crate::config::DecodeConfig;
use crate::error::{ClipError, Result};
use super::scaler::CachedScaler;
use super::types::{AudioStreamInfo, Frame, MovieInfo, SubtitleStreamInfo, VideoStreamInfo};

/// One open decode session against one media file
///
/// A clip is either fully loaded (decoder, demuxer and scaler alive) or
/// disposed. `Clip::load` never hands out a half-opened clip: every native
/// handle acquired before a failure is released when the error propagates.
pub struct Clip {
    path: PathBuf,
    config: DecodeConfig,
    session: Option<DecodeSession>,
    info: MovieInfo,
    time_base: Rational,
    start_time: i64,
    duration: f64,
    fps: f64,
    width: u32,
    height: u32,
    current: f64,
    thumbnail: Frame,
    image: Option<Frame>,
    has_audio: bool,
}

enum ReadOutcome {
    /// A frame was received; carries its best-effort timestamp
    Frame(Option<i64>),
    EndOfStream,
}

/// Native state of a loaded clip
struct DecodeSession {
    input: format::context::Input,
    decoder: codec::decoder::Video,
    stream_index: usize,
    /// Last frame handed out by the decoder
    raw: VideoFrame,
    /// Receive target; a failed receive clears it, so `raw` is only swapped on success
    scratch: VideoFrame,
    has_frame: bool,
    draining: bool,
    scaler: CachedScaler,
}

impl DecodeSession {
    fn read_next(&mut self) -> std::result::Result<ReadOutcome, ffmpeg::Error> {
        loop {
            match self.decoder.receive_frame(&mut self.scratch) {
                Ok(()) => {
                    std::mem::swap(&mut self.raw, &mut self.scratch);
                    self.has_frame = true;
                    let timestamp = self.raw.timestamp().or_else(|| self.raw.pts());
                    return Ok(ReadOutcome::Frame(timestamp));
                }
                Err(ffmpeg::Error::Eof) => return Ok(ReadOutcome::EndOfStream),
                // Before end of input the decoder only refuses because it wants more packets
                Err(_) if !self.draining => {}
                Err(e) => return Err(e),
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder.send_eof()?;
                    self.draining = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn seek(&mut self, stream_ts: i64, time_base: Rational) -> std::result::Result<(), ffmpeg::Error> {
        let ts = stream_ts.rescale(time_base, rescale::TIME_BASE);
        self.input.seek(ts, ..ts)?;
        self.decoder.flush();
        self.has_frame = false;
        self.draining = false;
        Ok(())
    }
}

/// First stream of `kind` in container order
fn first_stream(input: &format::context::Input, kind: media::Type) -> Option<format::stream::Stream<'_>> {
    input.streams().find(|stream| stream.parameters().medium() == kind)
}

fn rational_to_f64(value: Rational) -> Option<f64> {
    if value.numerator() > 0 && value.denominator() > 0 {
        Some(value.numerator() as f64 / value.denominator() as f64)
    } else {
        None
    }
}

fn codec_names(id: codec::Id) -> (String, String) {
    match codec::decoder::find(id) {
        Some(found) => (found.name().to_string(), found.description().to_string()),
        None => (format!("{:?}", id).to_lowercase(), String::new()),
    }
}

fn fourcc(tag: u32) -> String {
    if tag == 0 {
        return String::new();
    }
    tag.to_le_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
        .collect()
}

fn tag_value(stream: &format::stream::Stream, key: &str) -> Option<String> {
    stream.metadata().get(key).map(|v| v.to_string())
}

/// Collect container and per-stream metadata
fn probe_info(input: &format::context::Input, path: &Path, duration: f64, fallback_fps: f64) -> MovieInfo {
    let mut info = MovieInfo {
        filename: path.to_path_buf(),
        duration,
        size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        bit_rate: input.bit_rate(),
        format_short: input.format().name().to_string(),
        format_long: input.format().description().to_string(),
        ..Default::default()
    };

    for stream in input.streams() {
        let params = stream.parameters();
        let (codec_short, codec_long) = codec_names(params.id());
        // SAFETY: reading plain fields of a live AVCodecParameters
        let (codec_tag, bit_rate) = unsafe {
            let raw = params.as_ptr();
            (fourcc((*raw).codec_tag), (*raw).bit_rate)
        };
        let language = tag_value(&stream, "language");
        let title = tag_value(&stream, "title");

        match params.medium() {
            media::Type::Video => {
                let opened = codec::context::Context::from_parameters(params)
                    .and_then(|ctx| ctx.decoder().video());
                let (width, height, pixel_format) = match &opened {
                    Ok(decoder) => (
                        decoder.width(),
                        decoder.height(),
                        decoder
                            .format()
                            .descriptor()
                            .map(|d| d.name().to_string())
                            .unwrap_or_default(),
                    ),
                    Err(_) => (0, 0, String::new()),
                };
                let fps = rational_to_f64(stream.avg_frame_rate())
                    .or_else(|| rational_to_f64(stream.rate()))
                    .unwrap_or(fallback_fps);

                info.videos.push(VideoStreamInfo {
                    codec_short,
                    codec_long,
                    codec_tag,
                    bit_rate,
                    width,
                    height,
                    fps,
                    pixel_format,
                    language,
                    title,
                });
            }
            media::Type::Audio => {
                let (sample_rate, channels) = codec::context::Context::from_parameters(params)
                    .and_then(|ctx| ctx.decoder().audio())
                    .map(|decoder| (decoder.rate(), decoder.channels()))
                    .unwrap_or((0, 0));

                info.audios.push(AudioStreamInfo {
                    codec_short,
                    codec_long,
                    codec_tag,
                    bit_rate,
                    sample_rate,
                    channels,
                    language,
                    title,
                });
            }
            media::Type::Subtitle => {
                info.subs.push(SubtitleStreamInfo { language, title });
            }
            _ => {}
        }
    }

    info
}

impl Clip {
    /// Open `path`, pick its first video stream and decode frame 0
    ///
    /// On success the clip is loaded, positioned at its first frame and
    /// carries a thumbnail of that frame.
    pub fn load<P: AsRef<Path>>(path: P, config: &DecodeConfig) -> Result<Self> {
        super::init()?;

        let path = path.as_ref().to_path_buf();
        let display = path.display().to_string();
        let load_failed = |reason: String| ClipError::LoadFailed {
            path: display.clone(),
            reason,
        };

        let input = format::input(&path).map_err(|e| load_failed(e.to_string()))?;

        let (stream_index, time_base, start_time, stream_duration, fps, decoder) = {
            let stream = first_stream(&input, media::Type::Video)
                .ok_or_else(|| ClipError::NoVideoStream { path: display.clone() })?;

            let params = stream.parameters();
            let codec_id = params.id();
            let context = codec::context::Context::from_parameters(params)
                .map_err(|e| load_failed(e.to_string()))?;
            let decoder = context.decoder().video().map_err(|_| ClipError::DecoderUnavailable {
                codec: codec_names(codec_id).0,
            })?;

            let fps = match rational_to_f64(stream.avg_frame_rate()).or_else(|| rational_to_f64(stream.rate())) {
                Some(fps) => fps,
                None => {
                    warn!("{} reports no frame rate, assuming {} fps", display, config.fallback_fps);
                    config.fallback_fps
                }
            };

            let start_time = match stream.start_time() {
                ffmpeg::ffi::AV_NOPTS_VALUE => 0,
                t => t,
            };

            (stream.index(), stream.time_base(), start_time, stream.duration(), fps, decoder)
        };

        let duration = if stream_duration > 0 {
            stream_duration as f64 * f64::from(time_base)
        } else if input.duration() > 0 {
            input.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
        } else {
            return Err(load_failed("unknown duration".to_string()).into());
        };

        let has_audio = match first_stream(&input, media::Type::Audio) {
            Some(stream) => match codec::context::Context::from_parameters(stream.parameters())
                .and_then(|ctx| ctx.decoder().audio())
            {
                Ok(_) => true,
                Err(e) => {
                    warn!("Audio stream of {} is not decodable: {}", display, e);
                    false
                }
            },
            None => false,
        };

        let info = probe_info(&input, &path, duration, config.fallback_fps);
        let width = decoder.width();
        let height = decoder.height();

        let session = DecodeSession {
            input,
            decoder,
            stream_index,
            raw: VideoFrame::empty(),
            scratch: VideoFrame::empty(),
            has_frame: false,
            draining: false,
            scaler: CachedScaler::new(Flags::BILINEAR),
        };

        let mut clip = Self {
            path,
            config: config.clone(),
            session: Some(session),
            info,
            time_base,
            start_time,
            duration,
            fps,
            width,
            height,
            current: 0.0,
            thumbnail: Frame::new_black(1, 1),
            image: None,
            has_audio,
        };

        if !clip.read_and_decode_frame()? {
            return Err(load_failed("no decodable frames".to_string()).into());
        }

        if let Some(image) = &clip.image {
            clip.thumbnail = image.resized_to_width(config.thumbnail_width);
        }

        info!(
            "Loaded {}: {}x{} @ {:.3} fps, {:.3}s",
            display, clip.width, clip.height, clip.fps, clip.duration
        );

        Ok(clip)
    }

    /// Open an independent decode session on the same file
    pub fn reopen(&self) -> Result<Self> {
        Self::load(&self.path, &self.config)
    }

    /// Release every native resource; safe to call repeatedly
    pub fn dispose(&mut self) {
        if self.session.take().is_some() {
            info!("Disposed {}", self.path.display());
        }
        self.image = None;
    }

    pub fn loaded(&self) -> bool {
        self.session.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &MovieInfo {
        &self.info
    }

    /// Presentation time of the current frame in seconds
    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_period(&self) -> f64 {
        1.0 / self.fps
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_audio(&self) -> bool {
        self.has_audio
    }

    /// Preview image generated from frame 0 at load time
    pub fn thumbnail(&self) -> &Frame {
        &self.thumbnail
    }

    /// Most recently decoded display image
    pub fn image(&self) -> Option<&Frame> {
        self.image.as_ref()
    }

    /// Last frame received from the decoder, in its native pixel format
    pub fn raw_frame(&self) -> Option<&VideoFrame> {
        self.session
            .as_ref()
            .filter(|session| session.has_frame)
            .map(|session| &session.raw)
    }

    /// Seconds to stream time base units
    pub fn to_internal(&self, seconds: f64) -> i64 {
        let units = seconds / f64::from(self.time_base);
        units.round() as i64 + self.start_time
    }

    /// Stream time base units to seconds
    pub fn to_seconds(&self, internal: i64) -> f64 {
        (internal - self.start_time) as f64 * f64::from(self.time_base)
    }

    fn session_mut(&mut self) -> Result<&mut DecodeSession> {
        self.session.as_mut().ok_or_else(|| ClipError::NotLoaded.into())
    }

    /// Pull the next frame from the decoder, updating `current`
    fn read_frame(&mut self) -> Result<bool> {
        let outcome = self
            .session_mut()?
            .read_next()
            .map_err(|e| ClipError::DecodeFailed { reason: e.to_string() })?;

        match outcome {
            ReadOutcome::Frame(Some(ts)) => {
                self.current = self.to_seconds(ts).clamp(0.0, self.duration);
                Ok(true)
            }
            ReadOutcome::Frame(None) => {
                self.current = (self.current + self.frame_period()).min(self.duration);
                Ok(true)
            }
            ReadOutcome::EndOfStream => Ok(false),
        }
    }

    /// Convert the last read frame into the display image
    pub fn decode_frame(&mut self) -> Result<bool> {
        let session = self.session_mut()?;
        if !session.has_frame {
            return Ok(false);
        }

        let (width, height) = (session.raw.width(), session.raw.height());
        let rgb = session.scaler.scale(&session.raw, width, height, Pixel::RGB24)?;
        let frame = Frame::from_strided_rgb(width, height, rgb.stride(0), rgb.data(0)).ok_or_else(|| {
            ClipError::DecodeFailed {
                reason: "converted frame is smaller than expected".to_string(),
            }
        })?;

        self.image = Some(frame);
        Ok(true)
    }

    /// Read one frame and convert it for display; false at end of stream
    pub fn read_and_decode_frame(&mut self) -> Result<bool> {
        if !self.read_frame()? {
            return Ok(false);
        }
        self.decode_frame()
    }

    /// Read one frame without converting it; false at end of stream
    pub fn skip_frame(&mut self) -> Result<bool> {
        self.read_frame()
    }

    /// Position on the frame displayed at `seconds`
    ///
    /// Going backwards, or further ahead than `seek_ahead_threshold`, issues a
    /// native seek to the preceding key frame; otherwise frames are skipped
    /// sequentially. With `accurate` the skip continues until the frame
    /// nearest to the target; without it the first frame after the seek wins.
    pub fn goto_second_and_read(&mut self, seconds: f64, decode: bool, accurate: bool) -> Result<bool> {
        if !seconds.is_finite() {
            return Ok(false);
        }
        let target = seconds.clamp(0.0, self.duration);
        let half_period = self.frame_period() / 2.0;
        let has_frame = self.session_mut()?.has_frame;

        if has_frame && (target - self.current).abs() < half_period {
            return if decode { self.decode_frame() } else { Ok(true) };
        }

        let backwards = target < self.current;
        let far_ahead = target - self.current > self.config.seek_ahead_threshold;

        if !has_frame || backwards || far_ahead {
            debug!(
                "Seeking {} from {:.3}s to {:.3}s",
                self.path.display(),
                self.current,
                target
            );
            let stream_ts = self.to_internal(target);
            let time_base = self.time_base;
            self.session_mut()?
                .seek(stream_ts, time_base)
                .map_err(|e| ClipError::SeekFailed {
                    target,
                    reason: e.to_string(),
                })?;

            if !self.read_frame()? {
                return Ok(false);
            }
        } else if !self.read_frame()? {
            return Ok(false);
        }

        if accurate {
            while self.current + half_period < target {
                if !self.read_frame()? {
                    break;
                }
            }
        }

        if decode {
            self.decode_frame()
        } else {
            Ok(true)
        }
    }

    /// Seek to `ratio` (0..=1) of the duration
    pub fn goto_ratio_and_read(&mut self, ratio: f64) -> Result<bool> {
        self.goto_second_and_read(ratio.clamp(0.0, 1.0) * self.duration, true, true)
    }

    /// Step back `frames` frame periods; refused before time 0
    pub fn go_back(&mut self, frames: u32) -> Result<bool> {
        let target = self.current - frames as f64 * self.frame_period();
        if target < -self.frame_period() / 2.0 {
            return Ok(false);
        }
        self.goto_second_and_read(target.max(0.0), true, true)
    }
}

impl Drop for Clip {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_rendering() {
        assert_eq!(fourcc(u32::from_le_bytes(*b"avc1")), "avc1");
        assert_eq!(fourcc(0), "");
        assert_eq!(fourcc(u32::from_le_bytes([b'm', b'p', 0, 1])), "mp..");
    }

    #[test]
    fn test_rational_conversion_rejects_unknown_rates() {
        assert_eq!(rational_to_f64(Rational::new(25, 1)), Some(25.0));
        assert_eq!(rational_to_f64(Rational::new(0, 1)), None);
        assert_eq!(rational_to_f64(Rational::new(30000, 0)), None);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let config = DecodeConfig::default();
        let result = Clip::load("/no/such/clip.mp4", &config);
        assert!(matches!(
            result,
            Err(crate::error::EditorError::Clip(ClipError::LoadFailed { .. }))
        ));
    }

    #[test]
    fn test_load_non_media_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.mp4");
        std::fs::write(&path, b"definitely not a movie").unwrap();

        assert!(Clip::load(&path, &DecodeConfig::default()).is_err());
    }
}

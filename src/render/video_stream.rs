//! Video half of a render pass: one encoder, one output stream.

use std::ffi::{CStr, CString};
use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::codec;
use ffmpeg::encoder;
use ffmpeg::format::{self, Pixel};
use ffmpeg::software::scaling::Flags;
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::{Dictionary, Packet, Rational};
use tracing::debug;

use crate::error::{RenderError, Result};
use crate::video::CachedScaler;
use super::presets::{encoder_options, CodecFamily};
use super::spec::{RateControl, VideoOutput};
use super::two_pass::{PassPlan, StatsLog};

/// libavcodec's quality-to-lambda factor
const QP2LAMBDA: u32 = 118;

/// Set a frame to black: luma 0, both chroma planes 128
pub fn fill_black(frame: &mut VideoFrame) {
    frame.data_mut(0).fill(0);
    frame.data_mut(1).fill(128);
    frame.data_mut(2).fill(128);
}

fn write_failed(e: impl std::fmt::Display) -> RenderError {
    RenderError::WriteFailed { reason: e.to_string() }
}

/// Closest frame rate the encoder accepts, as a rational
fn frame_rate_for(codec: &ffmpeg::Codec, fps: f64) -> Rational {
    // mpeg4 caps the time base denominator at 16 bits
    let requested = Rational::from(unsafe { ffmpeg::ffi::av_d2q(fps, 65535) });

    let supported = codec.video().ok().and_then(|video| video.rates());
    match supported {
        Some(rates) => rates
            .min_by(|a, b| {
                let da = (f64::from(*a) - fps).abs();
                let db = (f64::from(*b) - fps).abs();
                da.total_cmp(&db)
            })
            .unwrap_or(requested),
        None => requested,
    }
}

pub struct VideoStream {
    encoder: encoder::video::Encoder,
    /// Read by the encoder; must outlive it
    _stats_in: Option<CString>,
    codec_name: String,
    stream_index: usize,
    time_base: Rational,
    stream_time_base: Rational,
    width: u32,
    height: u32,
    scaler: CachedScaler,
    black: VideoFrame,
    next_pts: i64,
    collect_stats: bool,
    stats: StatsLog,
    packets: u64,
}

impl VideoStream {
    /// Add a video stream to `octx` and open its encoder for `plan`
    pub fn open(
        octx: &mut format::context::Output,
        output: &VideoOutput,
        plan: &PassPlan,
        threads: usize,
        stats_file: Option<&Path>,
    ) -> Result<Self> {
        let codec = encoder::find_by_name(&output.codec).ok_or_else(|| RenderError::UnsupportedCodec {
            codec: output.codec.clone(),
        })?;
        let open_failed = |e: ffmpeg::Error| RenderError::EncoderOpenFailed {
            codec: output.codec.clone(),
            reason: e.to_string(),
        };

        let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);
        let stream_index = octx.add_stream(codec).map_err(open_failed)?.index();

        let frame_rate = frame_rate_for(&codec, output.fps);
        let time_base = frame_rate.invert();

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(open_failed)?;
        encoder.set_width(output.width);
        encoder.set_height(output.height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(frame_rate));
        encoder.set_gop(output.gop);
        encoder.set_aspect_ratio(Rational::new(1, 1));

        if threads > 0 {
            encoder.set_threading(codec::threading::Config {
                kind: codec::threading::Type::Frame,
                count: threads,
                ..Default::default()
            });
        }

        let family = CodecFamily::of(&output.codec);
        let mut opts = Dictionary::new();
        for (key, value) in encoder_options(&output.codec, output.preset, plan.role()) {
            opts.set(&key, &value);
        }

        let mut flags = codec::Flags::empty();
        if global_header {
            flags |= codec::Flags::GLOBAL_HEADER;
        }

        match output.rate {
            RateControl::Bitrate { kbps } => encoder.set_bit_rate(kbps as usize * 1000),
            RateControl::Quality { crf } => match family {
                CodecFamily::X264 | CodecFamily::Vpx => {
                    encoder.set_bit_rate(0);
                    opts.set("crf", &crf.to_string());
                }
                _ => {
                    flags |= codec::Flags::QSCALE;
                    opts.set("global_quality", &(crf * QP2LAMBDA).to_string());
                }
            },
        }

        if plan.collects_stats() {
            flags |= codec::Flags::PASS1;
        }

        let stats_in = match plan.stats_in() {
            Some(stats) => {
                flags |= codec::Flags::PASS2;
                Some(CString::new(stats).map_err(|_| RenderError::EncoderOpenFailed {
                    codec: output.codec.clone(),
                    reason: "pass statistics contain a NUL byte".to_string(),
                })?)
            }
            None => None,
        };
        encoder.set_flags(flags);

        if let (CodecFamily::X264, Some(path)) = (family, stats_file) {
            opts.set("stats", &path.to_string_lossy());
        }

        if let Some(stats) = &stats_in {
            // Borrowed for the encoder's lifetime, never freed by libavcodec
            unsafe {
                (*encoder.as_mut_ptr()).stats_in = stats.as_ptr() as *mut _;
            }
        }

        let opened = encoder.open_as_with(codec, opts).map_err(open_failed)?;

        let mut stream = octx.stream_mut(stream_index).ok_or_else(|| RenderError::EncoderOpenFailed {
            codec: output.codec.clone(),
            reason: "output stream vanished".to_string(),
        })?;
        stream.set_parameters(&opened);
        stream.set_time_base(time_base);

        let mut black = VideoFrame::new(Pixel::YUV420P, output.width, output.height);
        fill_black(&mut black);

        debug!(
            "Video stream #{}: {} {}x{} @ {}/{} ({:?})",
            stream_index,
            output.codec,
            output.width,
            output.height,
            frame_rate.numerator(),
            frame_rate.denominator(),
            plan.role()
        );

        Ok(Self {
            encoder: opened,
            _stats_in: stats_in,
            codec_name: output.codec.clone(),
            stream_index,
            time_base,
            stream_time_base: time_base,
            width: output.width,
            height: output.height,
            scaler: CachedScaler::new(Flags::BICUBIC),
            black,
            next_pts: 0,
            collect_stats: plan.collects_stats(),
            stats: StatsLog::new(),
            packets: 0,
        })
    }

    /// Pick up the time base the muxer settled on in `write_header`
    pub fn bind(&mut self, octx: &format::context::Output) {
        if let Some(stream) = octx.stream(self.stream_index) {
            self.stream_time_base = stream.time_base();
        }
    }

    /// Presentation time of the next frame, in seconds
    pub fn time(&self) -> f64 {
        self.next_pts as f64 * f64::from(self.time_base)
    }

    pub fn frame_period(&self) -> f64 {
        f64::from(self.time_base)
    }

    pub fn frames(&self) -> u64 {
        self.next_pts as u64
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    /// Encode `source` scaled to the output geometry, or black when None
    pub fn write_frame(&mut self, octx: &mut format::context::Output, source: Option<&VideoFrame>) -> Result<()> {
        let frame = match source {
            Some(source) => self.scaler.scale(source, self.width, self.height, Pixel::YUV420P)?,
            None => &mut self.black,
        };
        frame.set_pts(Some(self.next_pts));

        self.encoder.send_frame(frame).map_err(write_failed)?;
        self.next_pts += 1;
        self.drain(octx)
    }

    /// Flush frames the encoder is still holding
    pub fn finish(&mut self, octx: &mut format::context::Output) -> Result<()> {
        self.encoder.send_eof().map_err(write_failed)?;
        self.drain(octx)
    }

    /// Statistics collected during an analysis pass
    pub fn take_stats(&mut self) -> String {
        let stats = std::mem::take(&mut self.stats);
        debug!("{}: {} statistics chunks", self.codec_name, stats.chunks());
        stats.into_text()
    }

    fn drain(&mut self, octx: &mut format::context::Output) -> Result<()> {
        let mut packet = Packet::empty();
        loop {
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    if self.collect_stats {
                        self.capture_stats(false);
                    }

                    packet.set_stream(self.stream_index);
                    packet.rescale_ts(self.time_base, self.stream_time_base);
                    packet.write_interleaved(octx).map_err(write_failed)?;
                    self.packets += 1;
                }
                // libvpx publishes its first-pass statistics only here
                Err(ffmpeg::Error::Eof) => {
                    if self.collect_stats {
                        self.capture_stats(true);
                    }
                    return Ok(());
                }
                // The encoder wants more input
                Err(_) => return Ok(()),
            }
        }
    }

    fn capture_stats(&mut self, flushed: bool) {
        let text = unsafe {
            let ptr = (*self.encoder.as_ptr()).stats_out;
            if ptr.is_null() {
                return;
            }
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        };
        if flushed {
            self.stats.push_final(&text);
        } else {
            self.stats.push(&text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_fill_values() {
        let mut frame = VideoFrame::new(Pixel::YUV420P, 64, 48);
        frame.data_mut(0).fill(200);
        frame.data_mut(1).fill(7);

        fill_black(&mut frame);

        assert!(frame.data(0).iter().all(|&y| y == 0));
        assert!(frame.data(1).iter().all(|&u| u == 128));
        assert!(frame.data(2).iter().all(|&v| v == 128));
    }
}

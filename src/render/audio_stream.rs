//! Audio half of a render pass.
//!
//! Clips contribute no audio yet; the stream carries a synthesized tone so
//! the output has a correctly interleaved, correctly timed audio track.

use std::f64::consts::PI;
use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::codec;
use ffmpeg::encoder;
use ffmpeg::format::{self, sample, Sample};
use ffmpeg::media;
use ffmpeg::util::channel_layout::ChannelLayout;
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::{Dictionary, Packet, Rational};
use tracing::debug;

use crate::error::{RenderError, Result};
use super::spec::AudioOutput;

/// Byte capacity used to size frames of codecs without a fixed frame size
pub const PCM_BUFFER_BYTES: usize = 16_384;

const TONE_HZ: f64 = 110.0;
const TONE_AMPLITUDE: f64 = 10_000.0;

/// Sine tone whose frequency rises slowly, sample by sample
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    t: f64,
    tincr: f64,
    tincr2: f64,
}

impl ToneGenerator {
    pub fn new(sample_rate: u32) -> Self {
        let rate = f64::from(sample_rate.max(1));
        let tincr = 2.0 * PI * TONE_HZ / rate;
        Self {
            t: 0.0,
            tincr,
            tincr2: tincr / rate,
        }
    }

    /// Fill interleaved `samples`, the same value on every channel
    pub fn fill(&mut self, samples: &mut [i16], channels: usize) {
        for frame in samples.chunks_mut(channels.max(1)) {
            let value = (self.t.sin() * TONE_AMPLITUDE) as i16;
            frame.fill(value);
            self.t += self.tincr;
            self.tincr += self.tincr2;
        }
    }
}

/// Samples per channel in one encoder frame
pub fn frame_size_for(codec_frame_size: u32, channels: u16, bytes_per_sample: usize) -> usize {
    if codec_frame_size > 1 {
        codec_frame_size as usize
    } else {
        (PCM_BUFFER_BYTES / usize::from(channels.max(1)) / bytes_per_sample.max(1)).max(1)
    }
}

const PREFERRED_FORMATS: [Sample; 4] = [
    Sample::I16(sample::Type::Packed),
    Sample::I16(sample::Type::Planar),
    Sample::F32(sample::Type::Planar),
    Sample::F32(sample::Type::Packed),
];

fn pick_format(codec: &ffmpeg::Codec) -> Option<Sample> {
    let supported: Option<Vec<Sample>> = codec
        .audio()
        .ok()
        .and_then(|audio| audio.formats())
        .map(|formats| formats.collect());

    match supported {
        Some(formats) => PREFERRED_FORMATS.iter().copied().find(|f| formats.contains(f)),
        None => Some(PREFERRED_FORMATS[0]),
    }
}

fn pick_rate(codec: &ffmpeg::Codec, requested: u32) -> u32 {
    let rates: Option<Vec<i32>> = codec.audio().ok().and_then(|audio| audio.rates()).map(|r| r.collect());
    match rates {
        Some(rates) if !rates.is_empty() && !rates.contains(&(requested as i32)) => rates
            .iter()
            .min_by_key(|rate| (i64::from(**rate) - i64::from(requested)).abs())
            .map(|rate| *rate as u32)
            .unwrap_or(requested),
        _ => requested,
    }
}

/// Copy interleaved i16 samples into `frame` in the frame's own sample format
pub fn write_samples(frame: &mut AudioFrame, samples: &[i16], channels: usize) {
    let channels = channels.max(1);

    match frame.format() {
        Sample::I16(sample::Type::Packed) => {
            let data = frame.data_mut(0);
            for (bytes, value) in data.chunks_exact_mut(2).zip(samples) {
                bytes.copy_from_slice(&value.to_ne_bytes());
            }
        }
        Sample::I16(sample::Type::Planar) => {
            for channel in 0..channels {
                let data = frame.data_mut(channel);
                let plane = samples.iter().skip(channel).step_by(channels);
                for (bytes, value) in data.chunks_exact_mut(2).zip(plane) {
                    bytes.copy_from_slice(&value.to_ne_bytes());
                }
            }
        }
        Sample::F32(sample::Type::Packed) => {
            let data = frame.data_mut(0);
            for (bytes, value) in data.chunks_exact_mut(4).zip(samples) {
                bytes.copy_from_slice(&(f32::from(*value) / 32768.0).to_ne_bytes());
            }
        }
        Sample::F32(sample::Type::Planar) => {
            for channel in 0..channels {
                let data = frame.data_mut(channel);
                let plane = samples.iter().skip(channel).step_by(channels);
                for (bytes, value) in data.chunks_exact_mut(4).zip(plane) {
                    bytes.copy_from_slice(&(f32::from(*value) / 32768.0).to_ne_bytes());
                }
            }
        }
        _ => {}
    }
}

fn write_failed(e: impl std::fmt::Display) -> RenderError {
    RenderError::WriteFailed { reason: e.to_string() }
}

pub struct AudioStream {
    encoder: encoder::audio::Encoder,
    stream_index: usize,
    time_base: Rational,
    stream_time_base: Rational,
    channels: usize,
    frame_size: usize,
    frame: AudioFrame,
    buffer: Vec<i16>,
    tone: ToneGenerator,
    next_pts: i64,
}

impl AudioStream {
    /// Add an audio stream to `octx`; `path` lets the muxer pick its default codec
    pub fn open(octx: &mut format::context::Output, output: &AudioOutput, path: &Path) -> Result<Self> {
        let codec = match &output.codec {
            Some(name) => encoder::find_by_name(name).ok_or_else(|| RenderError::UnsupportedCodec {
                codec: name.clone(),
            })?,
            None => {
                let id = octx.format().codec(&path, media::Type::Audio);
                encoder::find(id).ok_or_else(|| RenderError::UnsupportedCodec {
                    codec: format!("{:?}", id),
                })?
            }
        };
        let codec_name = codec.name().to_string();
        let open_failed = |e: ffmpeg::Error| RenderError::EncoderOpenFailed {
            codec: codec_name.clone(),
            reason: e.to_string(),
        };

        let format = pick_format(&codec).ok_or_else(|| RenderError::UnsupportedCodec {
            codec: format!("{} (no 16-bit or float sample format)", codec_name),
        })?;
        let rate = pick_rate(&codec, output.sample_rate);
        let channels = output.channels.max(1);
        let layout = ChannelLayout::default(i32::from(channels));
        let time_base = Rational::new(1, rate as i32);

        let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);
        let stream_index = octx.add_stream(codec).map_err(open_failed)?.index();

        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(open_failed)?;
        encoder.set_rate(rate as i32);
        encoder.set_format(format);
        encoder.set_channel_layout(layout);
        encoder.set_channels(i32::from(channels));
        encoder.set_bit_rate(output.bitrate_kbps as usize * 1000);
        encoder.set_time_base(time_base);
        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let opened = encoder.open_as_with(codec, Dictionary::new()).map_err(open_failed)?;

        let mut stream = octx.stream_mut(stream_index).ok_or_else(|| RenderError::EncoderOpenFailed {
            codec: codec_name.clone(),
            reason: "output stream vanished".to_string(),
        })?;
        stream.set_parameters(&opened);
        stream.set_time_base(time_base);

        let frame_size = frame_size_for(opened.frame_size(), channels, format.bytes());
        let mut frame = AudioFrame::new(format, frame_size, layout);
        frame.set_rate(rate);

        debug!(
            "Audio stream #{}: {} {} Hz, {} ch, {:?}, {} samples/frame",
            stream_index, codec_name, rate, channels, format, frame_size
        );

        Ok(Self {
            encoder: opened,
            stream_index,
            time_base,
            stream_time_base: time_base,
            channels: usize::from(channels),
            frame_size,
            frame,
            buffer: vec![0; frame_size * usize::from(channels)],
            tone: ToneGenerator::new(rate),
            next_pts: 0,
        })
    }

    pub fn bind(&mut self, octx: &format::context::Output) {
        if let Some(stream) = octx.stream(self.stream_index) {
            self.stream_time_base = stream.time_base();
        }
    }

    /// Presentation time of the next frame, in seconds
    pub fn time(&self) -> f64 {
        self.next_pts as f64 * f64::from(self.time_base)
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Synthesize, encode and write one frame of tone
    pub fn write_frame(&mut self, octx: &mut format::context::Output) -> Result<()> {
        self.tone.fill(&mut self.buffer, self.channels);

        // The encoder may still reference the last frame's buffer
        if unsafe { ffmpeg::ffi::av_frame_make_writable(self.frame.as_mut_ptr()) } < 0 {
            return Err(write_failed("could not allocate a writable audio frame").into());
        }
        write_samples(&mut self.frame, &self.buffer, self.channels);
        self.frame.set_pts(Some(self.next_pts));

        self.encoder.send_frame(&self.frame).map_err(write_failed)?;
        self.next_pts += self.frame_size as i64;
        self.drain(octx)
    }

    pub fn finish(&mut self, octx: &mut format::context::Output) -> Result<()> {
        self.encoder.send_eof().map_err(write_failed)?;
        self.drain(octx)
    }

    fn drain(&mut self, octx: &mut format::context::Output) -> Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.time_base, self.stream_time_base);
            packet.write_interleaved(octx).map_err(write_failed)?;
        }
        Ok(())
    }
}

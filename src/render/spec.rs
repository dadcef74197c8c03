use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::RenderDefaults;
use crate::error::{RenderError, Result};
use crate::video::MovieInfo;

/// How the video encoder spends bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateControl {
    /// Target bitrate in kbit/s
    Bitrate { kbps: u32 },
    /// Constant quality; lower is better
    Quality { crf: u32 },
}

/// Video stream parameters of a render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoOutput {
    /// Encoder short name, e.g. "libx264"
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Maximum key-frame distance
    pub gop: u32,
    /// Compression preset, 1 (slowest, best) to 10 (fastest)
    pub preset: u8,
    /// 1 or 2
    pub passes: u8,
    pub rate: RateControl,
}

/// Audio stream parameters of a render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOutput {
    /// Encoder short name; None picks the container's default audio codec
    pub codec: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate_kbps: u32,
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self {
            codec: None,
            sample_rate: 44100,
            channels: 2,
            bitrate_kbps: 64,
        }
    }
}

/// Time range of the composition to render
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderSegment {
    pub start: f64,
    /// Upper bound on the rendered length; the composition end still applies
    pub max_duration: f64,
}

/// Everything the render pipeline needs to produce one output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSpec {
    pub path: PathBuf,
    /// Muxer short name, e.g. "mp4", "matroska"
    pub container: String,
    /// Encoder worker threads, 0 lets the encoder decide
    pub encoder_threads: usize,
    pub video: Option<VideoOutput>,
    pub audio: Option<AudioOutput>,
    /// None renders the whole composition
    pub segment: Option<RenderSegment>,
}

fn invalid(details: impl Into<String>) -> RenderError {
    RenderError::InvalidSpec {
        details: details.into(),
    }
}

fn even(value: u32) -> u32 {
    (value & !1).max(2)
}

impl RenderSpec {
    /// Video-only spec at the given geometry, filled in from the configured defaults
    pub fn from_defaults<P: AsRef<Path>>(
        path: P,
        defaults: &RenderDefaults,
        width: u32,
        height: u32,
        fps: f64,
    ) -> Self {
        let rate = match defaults.crf {
            Some(crf) => RateControl::Quality { crf },
            None => RateControl::Bitrate {
                kbps: defaults.bitrate_kbps,
            },
        };

        Self {
            path: path.as_ref().to_path_buf(),
            container: defaults.container.clone(),
            encoder_threads: defaults.resolved_threads(),
            video: Some(VideoOutput {
                codec: defaults.codec.clone(),
                width,
                height,
                fps,
                gop: defaults.gop,
                preset: defaults.preset,
                passes: defaults.passes,
                rate,
            }),
            audio: None,
            segment: None,
        }
    }

    /// Spec mirroring a source's own geometry, frame rate and stream layout
    pub fn from_movie_info<P: AsRef<Path>>(path: P, info: &MovieInfo, defaults: &RenderDefaults) -> Self {
        let (width, height, fps) = info
            .videos
            .first()
            .map(|video| (even(video.width), even(video.height), video.fps))
            .unwrap_or((320, 240, 25.0));
        let fps = if fps > 0.0 { fps } else { 25.0 };

        let mut spec = Self::from_defaults(path, defaults, width, height, fps);
        if let (Some(video), Some(source)) = (spec.video.as_mut(), info.videos.first()) {
            if defaults.crf.is_none() && source.bit_rate > 0 {
                video.rate = RateControl::Bitrate {
                    kbps: (source.bit_rate / 1000).max(1) as u32,
                };
            }
        }

        if let Some(audio) = info.audios.first() {
            spec.audio = Some(AudioOutput {
                codec: defaults.audio_codec.clone(),
                sample_rate: if audio.sample_rate > 0 { audio.sample_rate } else { 44100 },
                channels: audio.channels.clamp(1, 2),
                ..AudioOutput::default()
            });
        }

        spec
    }

    /// Number of passes the render runs
    pub fn passes(&self) -> u8 {
        self.video.as_ref().map(|video| video.passes).unwrap_or(1)
    }

    /// Reject specs the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(invalid("output path is empty").into());
        }

        if self.container.trim().is_empty() {
            return Err(invalid("container name is empty").into());
        }

        if self.video.is_none() && self.audio.is_none() {
            return Err(invalid("neither video nor audio is enabled").into());
        }

        if let Some(video) = &self.video {
            if video.codec.trim().is_empty() {
                return Err(invalid("video codec name is empty").into());
            }
            if video.width == 0 || video.height == 0 || video.width % 2 != 0 || video.height % 2 != 0 {
                return Err(invalid(format!(
                    "dimensions must be even and non-zero, got {}x{}",
                    video.width, video.height
                ))
                .into());
            }
            if !(video.fps > 0.0) || !video.fps.is_finite() {
                return Err(invalid(format!("frame rate must be positive, got {}", video.fps)).into());
            }
            if video.gop == 0 {
                return Err(invalid("gop must be non-zero").into());
            }
            if !(1..=10).contains(&video.preset) {
                return Err(invalid(format!("preset must be within 1..=10, got {}", video.preset)).into());
            }
            if !(1..=2).contains(&video.passes) {
                return Err(invalid(format!("passes must be 1 or 2, got {}", video.passes)).into());
            }
            match video.rate {
                RateControl::Bitrate { kbps: 0 } => {
                    return Err(invalid("bitrate must be non-zero").into());
                }
                RateControl::Quality { .. } if video.passes == 2 => {
                    return Err(invalid("two-pass encoding needs a target bitrate").into());
                }
                _ => {}
            }
        }

        if let Some(audio) = &self.audio {
            if audio.sample_rate == 0 || audio.channels == 0 {
                return Err(invalid("audio needs a sample rate and at least one channel").into());
            }
        }

        if let Some(segment) = &self.segment {
            if segment.start < 0.0 || !(segment.max_duration > 0.0) {
                return Err(invalid(format!(
                    "segment [{}, +{}] is empty or negative",
                    segment.start, segment.max_duration
                ))
                .into());
            }
        }

        Ok(())
    }
}

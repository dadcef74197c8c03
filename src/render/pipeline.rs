//! The per-pass render loop.
//!
//! Every pass repositions the composition at the segment start, opens a fresh
//! output file, and interleaves audio and video packets by presentation time
//! until the composition runs out of frames. Encoders, scalers and the muxer
//! are owned by the pass and released when it ends, whatever the outcome.

use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ffmpeg_next as ffmpeg;
use ffmpeg::format;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::composition::Composition;
use crate::error::{EditorError, RenderError, Result, TimelineError};
use super::audio_stream::AudioStream;
use super::presets::{CodecFamily, PassRole};
use super::spec::RenderSpec;
use super::two_pass::PassPlan;
use super::video_stream::VideoStream;

/// Where a render currently is
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderProgress {
    /// 1-based pass number
    pub pass: u8,
    pub passes: u8,
    /// Video frames written in this pass
    pub frames: u64,
    /// Seconds of the segment rendered in this pass
    pub seconds: f64,
    /// Length of the segment being rendered
    pub duration: f64,
}

impl RenderProgress {
    /// Overall completion in [0, 1], counting every pass
    pub fn fraction(&self) -> f64 {
        if self.passes == 0 || self.duration <= 0.0 {
            return 0.0;
        }
        let within = (self.seconds / self.duration).clamp(0.0, 1.0);
        ((f64::from(self.pass.saturating_sub(1)) + within) / f64::from(self.passes)).clamp(0.0, 1.0)
    }
}

/// Cancellation flag and progress channel shared with the caller
#[derive(Debug, Clone, Default)]
pub struct RenderControl {
    cancel: Arc<AtomicBool>,
    progress: Option<watch::Sender<RenderProgress>>,
}

impl RenderControl {
    pub fn new(cancel: Arc<AtomicBool>, progress: Option<watch::Sender<RenderProgress>>) -> Self {
        Self { cancel, progress }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn publish(&self, progress: RenderProgress) {
        if let Some(sender) = &self.progress {
            sender.send_replace(progress);
        }
    }
}

/// Outcome of one encoding pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub role: PassRole,
    pub frames: u64,
    pub audio_written: bool,
    /// Whether the encoder was asked to emit statistics
    pub collected_stats: bool,
    /// Statistics handed to the encoder, verbatim
    pub stats_in: Option<String>,
    /// Statistics the encoder emitted, verbatim
    pub stats_out: Option<String>,
}

/// Outcome of a finished render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport {
    pub path: PathBuf,
    pub passes: Vec<PassReport>,
    /// Video frames in the output file
    pub frames: u64,
    /// Size of the output file
    pub bytes: u64,
}

/// Inclusive-exclusive range of composition time the render covers
fn render_range(composition: &Composition, spec: &RenderSpec) -> (f64, f64) {
    let duration = composition.duration();
    match spec.segment {
        Some(segment) => {
            let start = segment.start.clamp(0.0, duration);
            (start, (start + segment.max_duration).min(duration))
        }
        None => (0.0, duration),
    }
}

fn open_output(spec: &RenderSpec) -> Result<format::context::Output> {
    let name = CString::new(spec.container.as_str()).map_err(|_| RenderError::UnsupportedContainer {
        container: spec.container.clone(),
    })?;
    let known = unsafe { !ffmpeg::ffi::av_guess_format(name.as_ptr(), std::ptr::null(), std::ptr::null()).is_null() };
    if !known {
        return Err(RenderError::UnsupportedContainer {
            container: spec.container.clone(),
        }
        .into());
    }

    format::output_as(&spec.path, &spec.container).map_err(|e| {
        RenderError::WriteFailed {
            reason: format!("could not create {}: {}", spec.path.display(), e),
        }
        .into()
    })
}

/// Render `composition` as described by `spec`
///
/// The composition is left positioned at the end of the rendered range.
pub fn render(composition: &mut Composition, spec: &RenderSpec, control: &RenderControl) -> Result<RenderReport> {
    spec.validate()?;
    if !composition.is_loaded() {
        return Err(TimelineError::Empty.into());
    }
    crate::video::init()?;

    let passes = spec.passes();
    let (start, end) = render_range(composition, spec);

    info!("🎬 Rendering {} ({} pass{})", spec.path.display(), passes, if passes > 1 { "es" } else { "" });
    info!("   Range: {:.3}s - {:.3}s, container {}", start, end, spec.container);

    // libx264 keeps its statistics on disk rather than in stats_out
    let stats_dir = match &spec.video {
        Some(video) if passes > 1 && CodecFamily::of(&video.codec) == CodecFamily::X264 => Some(tempfile::tempdir()?),
        _ => None,
    };
    let stats_file = stats_dir.as_ref().map(|dir| dir.path().join("x264_2pass.log"));

    let mut stats = String::new();
    let mut reports = Vec::with_capacity(passes as usize);

    for pass in 1..=passes {
        let plan = PassPlan::for_pass(pass, passes, std::mem::take(&mut stats));
        info!("🔄 Pass {}/{} ({:?})", pass, passes, plan.role());

        let report = run_pass(composition, spec, &plan, pass, passes, (start, end), stats_file.as_deref(), control)?;
        info!("   ✅ Pass {} wrote {} frames", pass, report.frames);

        if let Some(out) = &report.stats_out {
            if out.is_empty() && stats_dir.is_none() {
                return Err(RenderError::EncoderOpenFailed {
                    codec: spec.video.as_ref().map(|video| video.codec.clone()).unwrap_or_default(),
                    reason: "the analysis pass produced no statistics".to_string(),
                }
                .into());
            }
            stats = out.clone();
        }
        reports.push(report);
    }

    let bytes = std::fs::metadata(&spec.path)?.len();
    let frames = reports.last().map(|report| report.frames).unwrap_or(0);

    info!("✅ Render complete: {} ({} frames, {} bytes)", spec.path.display(), frames, bytes);

    Ok(RenderReport {
        path: spec.path.clone(),
        passes: reports,
        frames,
        bytes,
    })
}

#[allow(clippy::too_many_arguments)]
fn run_pass(
    composition: &mut Composition,
    spec: &RenderSpec,
    plan: &PassPlan,
    pass: u8,
    passes: u8,
    (start, end): (f64, f64),
    stats_file: Option<&Path>,
    control: &RenderControl,
) -> Result<PassReport> {
    composition.set_gap_fps(spec.video.as_ref().map(|video| video.fps));
    composition.goto_second_and_read(start, false, true)?;

    let mut octx = open_output(spec)?;

    let mut video = match &spec.video {
        Some(output) => Some(VideoStream::open(&mut octx, output, plan, spec.encoder_threads, stats_file)?),
        None => None,
    };
    let mut audio = match &spec.audio {
        Some(output) if plan.writes_audio() => Some(AudioStream::open(&mut octx, output, &spec.path)?),
        _ => None,
    };

    octx.write_header().map_err(|e| RenderError::WriteFailed {
        reason: format!("could not write header: {}", e),
    })?;
    if let Some(video) = video.as_mut() {
        video.bind(&octx);
    }
    if let Some(audio) = audio.as_mut() {
        audio.bind(&octx);
    }

    let progress = |frames: u64, seconds: f64| RenderProgress {
        pass,
        passes,
        frames,
        seconds,
        duration: end - start,
    };
    control.publish(progress(0, 0.0));

    let outcome = interleave(composition, &mut octx, video.as_mut(), audio.as_mut(), (start, end), control, &progress);

    // Flush and close out the file even when the loop failed, so whatever
    // was written stays readable
    let flushed = match &outcome {
        Ok(()) => flush(&mut octx, video.as_mut(), audio.as_mut()),
        Err(_) => Ok(()),
    };
    let trailer = octx.write_trailer().map_err(|e| {
        EditorError::from(RenderError::WriteFailed {
            reason: format!("could not write trailer: {}", e),
        })
    });

    if let Err(e) = &outcome {
        if e.is_cancelled() {
            info!("🛑 Render cancelled during pass {}", pass);
        } else {
            warn!("Pass {} failed: {}", pass, e);
        }
    }
    outcome?;
    flushed?;
    trailer?;

    let frames = video.as_ref().map(|video| video.frames()).unwrap_or(0);
    let stats_out = match video.as_mut() {
        Some(video) if plan.collects_stats() => Some(video.take_stats()),
        _ => None,
    };
    if let Some(text) = &stats_out {
        debug!("Collected {} bytes of pass statistics", text.len());
    }

    Ok(PassReport {
        role: plan.role(),
        frames,
        audio_written: audio.is_some(),
        collected_stats: plan.collects_stats(),
        stats_in: plan.stats_in().map(str::to_string),
        stats_out,
    })
}

fn interleave(
    composition: &mut Composition,
    octx: &mut format::context::Output,
    mut video: Option<&mut VideoStream>,
    mut audio: Option<&mut AudioStream>,
    (start, end): (f64, f64),
    control: &RenderControl,
    progress: &dyn Fn(u64, f64) -> RenderProgress,
) -> Result<()> {
    let length = end - start;
    let mut exhausted = length <= 0.0;

    while !exhausted {
        if control.is_cancelled() {
            return Err(RenderError::Cancelled.into());
        }

        let video_time = video.as_ref().map(|stream| stream.time());
        let audio_time = audio.as_ref().map(|stream| stream.time());

        let audio_turn = match (audio_time, video_time) {
            (Some(_), None) => true,
            (Some(a), Some(v)) => a < v,
            _ => false,
        };

        if audio_turn {
            if let Some(stream) = audio.as_mut() {
                stream.write_frame(octx)?;
            }
            if video.is_none() {
                let seconds = audio_time.unwrap_or(0.0);
                exhausted = seconds >= length;
                control.publish(progress(0, seconds.min(length)));
            }
            continue;
        }

        let Some(stream) = video.as_mut() else {
            break;
        };
        stream.write_frame(octx, composition.current_raw_frame())?;

        let advanced = composition.skip_frame()?;
        let seconds = composition.current() - start;
        exhausted = !advanced || seconds > length - stream.frame_period() / 2.0;
        control.publish(progress(stream.frames(), seconds.min(length)));
    }

    Ok(())
}

fn flush(
    octx: &mut format::context::Output,
    video: Option<&mut VideoStream>,
    audio: Option<&mut AudioStream>,
) -> Result<()> {
    if let Some(video) = video {
        video.finish(octx)?;
        debug!("{} encoder flushed ({} packets)", video.codec_name(), video.packets());
    }
    if let Some(audio) = audio {
        audio.finish(octx)?;
        debug!("Audio encoder flushed ({} samples per frame)", audio.frame_size());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DecodeConfig, RenderDefaults};

    #[test]
    fn test_progress_fraction_spans_passes() {
        let first_half = RenderProgress {
            pass: 1,
            passes: 2,
            frames: 50,
            seconds: 5.0,
            duration: 10.0,
        };
        assert_eq!(first_half.fraction(), 0.25);

        let done = RenderProgress {
            pass: 2,
            seconds: 10.0,
            ..first_half
        };
        assert_eq!(done.fraction(), 1.0);
        assert_eq!(RenderProgress::default().fraction(), 0.0);
    }

    #[test]
    fn test_control_cancel_is_shared() {
        let control = RenderControl::default();
        let clone = control.clone();
        assert!(!clone.is_cancelled());

        control.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_render_of_empty_composition_fails() {
        let dir = tempfile::tempdir().unwrap();
        let spec = RenderSpec::from_defaults(dir.path().join("out.mp4"), &RenderDefaults::default(), 320, 240, 25.0);
        let mut composition = Composition::new(DecodeConfig::default());

        let err = render(&mut composition, &spec, &RenderControl::default()).unwrap_err();
        assert!(matches!(err, EditorError::Timeline(TimelineError::Empty)));
        assert!(!spec.path.exists());
    }

    #[test]
    fn test_invalid_spec_rejected_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = RenderSpec::from_defaults(dir.path().join("out.mp4"), &RenderDefaults::default(), 321, 240, 25.0);
        spec.encoder_threads = 1;
        let mut composition = Composition::new(DecodeConfig::default());

        let err = render(&mut composition, &spec, &RenderControl::default()).unwrap_err();
        assert!(matches!(err, EditorError::Render(RenderError::InvalidSpec { .. })));
        assert!(!spec.path.exists());
    }
}

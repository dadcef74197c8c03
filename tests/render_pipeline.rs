mod common;

use std::path::{Path, PathBuf};

use ffmpeg_next::encoder;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::util::frame::video::Video as VideoFrame;

use reelcut::composition::{Composition, Interval};
use reelcut::config::{DecodeConfig, EditorConfig, RenderDefaults};
use reelcut::render::{
    pipeline, render_preview, AudioOutput, PassRole, RenderControl, RenderJob, RenderSegment, RenderSpec,
};
use reelcut::video::Clip;
use reelcut::{EditorError, TimelineSnapshot};

use common::{mean_red, synthesize_clip, FPS, FRAME_TOLERANCE, HEIGHT, WIDTH};

fn defaults(codec: &str, passes: u8) -> RenderDefaults {
    RenderDefaults {
        container: "matroska".to_string(),
        codec: codec.to_string(),
        bitrate_kbps: 800,
        preset: 8,
        passes,
        encoder_threads: 1,
        ..RenderDefaults::default()
    }
}

fn spec_for(path: &Path, codec: &str, passes: u8) -> RenderSpec {
    RenderSpec::from_defaults(path, &defaults(codec, passes), WIDTH, HEIGHT, 25.0)
}

fn with_audio(mut spec: RenderSpec) -> RenderSpec {
    spec.audio = Some(AudioOutput {
        codec: Some("mp2".to_string()),
        ..AudioOutput::default()
    });
    spec
}

/// Whether every visible sample of `plane` equals `value`
fn plane_is(frame: &VideoFrame, plane: usize, value: u8) -> bool {
    let width = frame.plane_width(plane) as usize;
    let height = frame.plane_height(plane) as usize;
    frame
        .data(plane)
        .chunks(frame.stride(plane))
        .take(height)
        .all(|row| row[..width].iter().all(|&sample| sample == value))
}

fn single_clip(dir: &Path) -> (Composition, PathBuf) {
    let source = synthesize_clip(dir, "ramp.mkv");
    let mut composition = Composition::new(DecodeConfig::default());
    composition.load(&source).unwrap();
    (composition, source)
}

#[test]
fn test_render_whole_clip() {
    let dir = tempfile::tempdir().unwrap();
    let (mut composition, _) = single_clip(dir.path());
    let spec = spec_for(&dir.path().join("out.mkv"), "mpeg4", 1);

    let report = composition.render(&spec).unwrap();

    assert_eq!(report.frames, 250);
    assert_eq!(report.passes.len(), 1);
    assert_eq!(report.passes[0].role, PassRole::Single);
    assert!(report.bytes > 0);

    let output = Clip::load(&report.path, &DecodeConfig::default()).unwrap();
    assert_eq!((output.width(), output.height()), (WIDTH, HEIGHT));
    assert!((output.duration() - 10.0).abs() <= 1.0 / FPS, "duration {:.3}s", output.duration());
    assert!(!output.has_audio());
}

#[test]
fn test_render_with_audio_track() {
    let dir = tempfile::tempdir().unwrap();
    let (mut composition, _) = single_clip(dir.path());
    let spec = with_audio(spec_for(&dir.path().join("out.mkv"), "mpeg4", 1));

    let report = composition.render(&spec).unwrap();
    assert!(report.passes[0].audio_written);

    let output = Clip::load(&report.path, &DecodeConfig::default()).unwrap();
    assert!(output.has_audio());
    assert_eq!(output.info().audios[0].codec_short, "mp2");
    assert_eq!(output.info().audios[0].channels, 2);
}

#[test]
fn test_render_segment() {
    let dir = tempfile::tempdir().unwrap();
    let (mut composition, _) = single_clip(dir.path());
    let mut spec = spec_for(&dir.path().join("out.mkv"), "mpeg4", 1);
    spec.segment = Some(RenderSegment {
        start: 4.0,
        max_duration: 2.0,
    });

    let report = composition.render(&spec).unwrap();

    assert_eq!(report.frames, 50);
    let output = Clip::load(&report.path, &DecodeConfig::default()).unwrap();
    assert!((output.duration() - 2.0).abs() <= 1.0 / FPS, "duration {:.3}s", output.duration());
}

#[test]
fn test_gaps_render_black() {
    let dir = tempfile::tempdir().unwrap();
    let (mut composition, _) = single_clip(dir.path());
    let id = composition.effective_intervals()[0].clip;
    composition
        .commit_intervals(vec![Interval::new(id, 0.0, 2.0), Interval::new(id, 3.0, 2.0)])
        .unwrap();

    // Lossless, so black stays exactly black
    let spec = spec_for(&dir.path().join("gap.mkv"), "ffv1", 1);
    let report = composition.render(&spec).unwrap();
    assert_eq!(report.frames, 125);

    let mut output = Clip::load(&report.path, &DecodeConfig::default()).unwrap();

    // Every frame of the gap, not just one
    for target in [2.0, 2.5, 2.96] {
        output.goto_second_and_read(target, true, true).unwrap();
        assert!((output.current() - target).abs() <= FRAME_TOLERANCE);

        let gap = output.raw_frame().unwrap();
        assert_eq!(gap.format(), Pixel::YUV420P);
        assert!(plane_is(gap, 0, 0), "luma is not 0 at {:.2}s", target);
        assert!(plane_is(gap, 1, 128), "U is not 128 at {:.2}s", target);
        assert!(plane_is(gap, 2, 128), "V is not 128 at {:.2}s", target);
    }

    output.goto_second_and_read(1.0, true, true).unwrap();
    assert!(!plane_is(output.raw_frame().unwrap(), 0, 0));
    assert!(mean_red(output.image().unwrap()) > 10.0);

    output.goto_second_and_read(3.5, true, true).unwrap();
    assert!(!plane_is(output.raw_frame().unwrap(), 0, 0));
}

#[test]
fn test_two_pass_hands_statistics_over() {
    let dir = tempfile::tempdir().unwrap();
    let (mut composition, _) = single_clip(dir.path());
    let spec = with_audio(spec_for(&dir.path().join("two_pass.mkv"), "mpeg4", 2));

    let report = composition.render(&spec).unwrap();
    assert_eq!(report.passes.len(), 2);

    let (analyze, last) = (&report.passes[0], &report.passes[1]);
    assert_eq!(analyze.role, PassRole::Analyze);
    assert_eq!(last.role, PassRole::Final);

    assert!(analyze.collected_stats);
    assert!(!last.collected_stats);
    let stats = analyze.stats_out.as_deref().unwrap();
    assert!(!stats.is_empty());
    assert_eq!(last.stats_in.as_deref(), Some(stats));

    // Only the final pass carries audio
    assert!(!analyze.audio_written);
    assert!(last.audio_written);
    assert_eq!(analyze.frames, last.frames);

    let output = Clip::load(&report.path, &DecodeConfig::default()).unwrap();
    assert!(output.has_audio());
}

#[test]
fn test_two_pass_vpx_hands_flushed_statistics_over() {
    let dir = tempfile::tempdir().unwrap();
    let (mut composition, _) = single_clip(dir.path());
    if encoder::find_by_name("libvpx").is_none() {
        eprintln!("libvpx is not available, skipping");
        return;
    }
    let spec = spec_for(&dir.path().join("two_pass_vp8.mkv"), "libvpx", 2);

    let report = composition.render(&spec).unwrap();

    let (analyze, last) = (&report.passes[0], &report.passes[1]);
    let stats = analyze.stats_out.as_deref().unwrap();
    assert!(!stats.is_empty());
    assert_eq!(last.stats_in.as_deref(), Some(stats));
    assert_eq!(last.frames, 250);

    let output = Clip::load(&report.path, &DecodeConfig::default()).unwrap();
    assert_eq!(output.info().videos[0].codec_short, "vp8");
}

#[test]
fn test_cancelled_render_reports_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let (mut composition, _) = single_clip(dir.path());
    let spec = spec_for(&dir.path().join("cancelled.mkv"), "mpeg4", 1);

    let control = RenderControl::default();
    control.cancel();
    let err = pipeline::render(&mut composition, &spec, &control).unwrap_err();

    assert!(err.is_cancelled());
    assert!(matches!(err, EditorError::Render(_)));
    // The partial file is left for the caller
    assert!(spec.path.exists());
}

#[test]
fn test_unknown_container_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (mut composition, _) = single_clip(dir.path());
    let mut spec = spec_for(&dir.path().join("out.bin"), "mpeg4", 1);
    spec.container = "no-such-muxer".to_string();

    assert!(composition.render(&spec).is_err());
    assert!(!spec.path.exists());
}

#[test]
fn test_unknown_codec_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (mut composition, _) = single_clip(dir.path());
    let spec = spec_for(&dir.path().join("out.mkv"), "no-such-encoder", 1);

    assert!(composition.render(&spec).is_err());
}

#[tokio::test]
async fn test_job_reports_progress() {
    let dir = tempfile::tempdir().unwrap();
    let (composition, _) = single_clip(dir.path());
    let spec = spec_for(&dir.path().join("job.mkv"), "mpeg4", 1);

    let job = RenderJob::spawn(composition.snapshot(), spec, EditorConfig::default());
    let progress = job.progress();
    let report = job.wait().await.unwrap();

    assert_eq!(report.frames, 250);
    let last = *progress.borrow();
    assert_eq!((last.pass, last.passes), (1, 1));
    assert!(last.fraction() > 0.95, "ended at {:.3}", last.fraction());

    // The caller's composition was never touched
    assert_eq!(composition.current(), 0.0);
}

#[tokio::test]
async fn test_job_can_be_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let source = synthesize_clip(dir.path(), "ramp.mkv");
    let snapshot = TimelineSnapshot::sequential(&[
        (source.clone(), 10.0),
        (source.clone(), 10.0),
        (source, 10.0),
    ]);
    let spec = spec_for(&dir.path().join("job.mkv"), "mpeg4", 1);

    let job = RenderJob::spawn(snapshot, spec, EditorConfig::default());
    job.cancel();

    let err = job.wait().await.unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_preview_renders_a_short_snippet() {
    let dir = tempfile::tempdir().unwrap();
    let (mut composition, _) = single_clip(dir.path());
    composition.goto_second_and_read(3.0, true, true).unwrap();
    let before = composition.current();

    let mut config = EditorConfig::default();
    config.render = defaults("mpeg4", 1);

    let preview = render_preview(&composition, &config).unwrap();
    let path = preview.path().to_path_buf();

    assert!(path.exists());
    assert!((preview.clip().duration() - 2.0).abs() < 0.1);
    assert_eq!(composition.current(), before);

    drop(preview);
    assert!(!path.exists());
}

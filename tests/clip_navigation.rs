mod common;

use reelcut::config::DecodeConfig;
use reelcut::video::Clip;

use common::{mean_red, synthesize_clip, synthesize_two_video_streams, FPS, FRAME_TOLERANCE, HEIGHT, WIDTH};

fn open_clip() -> (tempfile::TempDir, Clip) {
    let dir = tempfile::tempdir().unwrap();
    let path = synthesize_clip(dir.path(), "ramp.mkv");
    let clip = Clip::load(&path, &DecodeConfig::default()).unwrap();
    (dir, clip)
}

#[test]
fn test_load_reports_stream_properties() {
    let (_dir, clip) = open_clip();

    assert!(clip.loaded());
    assert_eq!(clip.current(), 0.0);
    assert_eq!((clip.width(), clip.height()), (WIDTH, HEIGHT));
    assert!((clip.fps() - FPS).abs() < 0.01);
    assert!((clip.duration() - 10.0).abs() < 0.1);
    assert!(!clip.has_audio());

    let info = clip.info();
    assert_eq!(info.videos.len(), 1);
    assert_eq!(info.videos[0].codec_short, "mpeg4");
    assert!(info.to_string().contains("mpeg4"));

    // Thumbnail keeps the aspect ratio at the configured width
    assert_eq!(clip.thumbnail().width(), 160);
    assert_eq!(clip.thumbnail().height(), 120);
}

#[test]
fn test_seek_lands_within_half_a_frame() {
    let (_dir, mut clip) = open_clip();

    // forward within the threshold, far forward, backwards, near the end
    for target in [1.01, 3.31, 7.53, 0.45, 9.9] {
        assert!(clip.goto_second_and_read(target, true, true).unwrap());
        assert!(
            (clip.current() - target).abs() <= FRAME_TOLERANCE,
            "wanted {:.3}s, landed on {:.3}s",
            target,
            clip.current()
        );
        assert!(clip.image().is_some());
    }
}

#[test]
fn test_seek_shows_the_right_picture() {
    let (_dir, mut clip) = open_clip();

    clip.goto_second_and_read(2.0, true, true).unwrap();
    let early = mean_red(clip.image().unwrap());

    clip.goto_second_and_read(8.0, true, true).unwrap();
    let late = mean_red(clip.image().unwrap());

    // The synthesized clip brightens over time
    assert!(late > early + 50.0, "early {:.1}, late {:.1}", early, late);
}

#[test]
fn test_sequential_reads_advance_one_frame_at_a_time() {
    let (_dir, mut clip) = open_clip();
    clip.goto_second_and_read(0.0, true, true).unwrap();

    let mut previous = clip.current();
    for _ in 0..60 {
        assert!(clip.read_and_decode_frame().unwrap());
        let step = clip.current() - previous;
        assert!((step - 1.0 / FPS).abs() < 1e-3, "step of {:.4}s", step);
        previous = clip.current();
    }
}

#[test]
fn test_reading_past_the_end_reports_end_of_stream() {
    let (_dir, mut clip) = open_clip();
    clip.goto_second_and_read(9.8, true, true).unwrap();

    let mut reads = 0;
    while clip.read_and_decode_frame().unwrap() {
        reads += 1;
        assert!(reads < 20, "end of stream never reported");
    }
    let last = clip.current();
    assert!((last - 9.96).abs() <= FRAME_TOLERANCE, "last frame at {:.3}s", last);

    // Further calls keep reporting the end and leave the cursor alone
    assert!(!clip.read_and_decode_frame().unwrap());
    assert!(!clip.skip_frame().unwrap());
    assert_eq!(clip.current(), last);
    assert!(clip.image().is_some());
}

#[test]
fn test_non_finite_seek_is_refused() {
    let (_dir, mut clip) = open_clip();
    clip.goto_second_and_read(2.0, true, true).unwrap();
    let before = clip.current();

    assert!(!clip.goto_second_and_read(f64::NAN, true, true).unwrap());
    assert!(!clip.goto_second_and_read(f64::INFINITY, true, true).unwrap());
    assert_eq!(clip.current(), before);
}

#[test]
fn test_first_video_stream_is_opened() {
    let dir = tempfile::tempdir().unwrap();
    let path = synthesize_two_video_streams(dir.path(), "two_streams.mkv");

    let clip = Clip::load(&path, &DecodeConfig::default()).unwrap();

    assert_eq!(clip.info().videos.len(), 2);
    assert_eq!((clip.width(), clip.height()), (WIDTH, HEIGHT));
}

#[test]
fn test_go_back_steps_frames_and_refuses_before_zero() {
    let (_dir, mut clip) = open_clip();

    clip.goto_second_and_read(5.0, true, true).unwrap();
    assert!(clip.go_back(10).unwrap());
    assert!((clip.current() - 4.6).abs() <= FRAME_TOLERANCE);

    clip.goto_second_and_read(0.12, true, true).unwrap();
    let before = clip.current();
    assert!(!clip.go_back(10).unwrap());
    assert_eq!(clip.current(), before);

    assert!(clip.go_back(3).unwrap());
    assert!(clip.current().abs() <= FRAME_TOLERANCE);
}

#[test]
fn test_ratio_seek() {
    let (_dir, mut clip) = open_clip();

    assert!(clip.goto_ratio_and_read(0.5).unwrap());
    assert!((clip.current() - clip.duration() / 2.0).abs() <= FRAME_TOLERANCE);
}

#[test]
fn test_dispose_is_idempotent() {
    let (_dir, mut clip) = open_clip();

    clip.dispose();
    clip.dispose();

    assert!(!clip.loaded());
    assert!(clip.image().is_none());
    assert!(clip.raw_frame().is_none());
    assert!(clip.goto_second_and_read(1.0, true, true).is_err());
}

#[test]
fn test_reopen_gives_an_independent_session() {
    let (_dir, mut clip) = open_clip();
    clip.goto_second_and_read(6.0, false, true).unwrap();

    let copy = clip.reopen().unwrap();
    assert_eq!(copy.current(), 0.0);
    assert!((clip.current() - 6.0).abs() <= FRAME_TOLERANCE);
}

#[test]
fn test_ratio_back_and_forward_scenario() {
    let (_dir, mut clip) = open_clip();

    assert!(clip.goto_ratio_and_read(0.5).unwrap());
    assert!((clip.current() - 5.0).abs() <= 1.0 / FPS);

    assert!(clip.go_back(25).unwrap());
    assert!((clip.current() - 4.0).abs() <= 1.0 / FPS);

    for _ in 0..25 {
        assert!(clip.read_and_decode_frame().unwrap());
    }
    assert!((clip.current() - 5.0).abs() <= 1.0 / FPS);
}

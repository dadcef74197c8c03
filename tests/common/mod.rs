//! Synthesized media shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::util::frame::video::Video as VideoFrame;

use reelcut::render::video_stream::VideoStream;
use reelcut::render::{PassPlan, RateControl, VideoOutput};

pub const FPS: f64 = 25.0;
pub const FRAMES: u32 = 250;
pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 240;

/// Half a frame period plus rounding slack
pub const FRAME_TOLERANCE: f64 = 0.5 / FPS + 1e-3;

/// Luma of frame `index`; rises steadily over the clip
pub fn luma_for(index: u32) -> u8 {
    (16 + index * 219 / FRAMES) as u8
}

/// Write a 10 s, 25 fps flat-grey clip whose brightness rises frame by frame
pub fn synthesize_clip(dir: &Path, name: &str) -> PathBuf {
    reelcut::video::init().unwrap();

    let path = dir.join(name);
    let mut octx = ffmpeg::format::output_as(&path, "matroska").unwrap();

    let output = VideoOutput {
        codec: "mpeg4".to_string(),
        width: WIDTH,
        height: HEIGHT,
        fps: FPS,
        gop: 12,
        preset: 10,
        passes: 1,
        rate: RateControl::Bitrate { kbps: 1000 },
    };
    let mut stream = VideoStream::open(&mut octx, &output, &PassPlan::Single, 1, None).unwrap();
    octx.write_header().unwrap();
    stream.bind(&octx);

    let mut frame = VideoFrame::new(Pixel::YUV420P, WIDTH, HEIGHT);
    for index in 0..FRAMES {
        frame.data_mut(0).fill(luma_for(index));
        frame.data_mut(1).fill(128);
        frame.data_mut(2).fill(128);
        stream.write_frame(&mut octx, Some(&frame)).unwrap();
    }

    stream.finish(&mut octx).unwrap();
    octx.write_trailer().unwrap();
    path
}

/// Write a 2 s Matroska file with two video streams: 320x240 first, then a
/// larger, higher-bitrate 640x480 one
pub fn synthesize_two_video_streams(dir: &Path, name: &str) -> PathBuf {
    reelcut::video::init().unwrap();

    let path = dir.join(name);
    let mut octx = ffmpeg::format::output_as(&path, "matroska").unwrap();

    let output = |width: u32, height: u32, kbps: u32| VideoOutput {
        codec: "mpeg4".to_string(),
        width,
        height,
        fps: FPS,
        gop: 12,
        preset: 10,
        passes: 1,
        rate: RateControl::Bitrate { kbps },
    };
    let mut first = VideoStream::open(&mut octx, &output(WIDTH, HEIGHT, 300), &PassPlan::Single, 1, None).unwrap();
    let mut second = VideoStream::open(&mut octx, &output(640, 480, 3000), &PassPlan::Single, 1, None).unwrap();
    octx.write_header().unwrap();
    first.bind(&octx);
    second.bind(&octx);

    let mut small = VideoFrame::new(Pixel::YUV420P, WIDTH, HEIGHT);
    let mut large = VideoFrame::new(Pixel::YUV420P, 640, 480);
    for index in 0..50 {
        for frame in [&mut small, &mut large] {
            frame.data_mut(0).fill(luma_for(index));
            frame.data_mut(1).fill(128);
            frame.data_mut(2).fill(128);
        }
        first.write_frame(&mut octx, Some(&small)).unwrap();
        second.write_frame(&mut octx, Some(&large)).unwrap();
    }

    first.finish(&mut octx).unwrap();
    second.finish(&mut octx).unwrap();
    octx.write_trailer().unwrap();
    path
}

/// Mean of the red channel over the whole image
pub fn mean_red(frame: &reelcut::Frame) -> f64 {
    let image = frame.as_image();
    let total: u64 = image.pixels().map(|p| u64::from(p.0[0])).sum();
    total as f64 / (u64::from(image.width()) * u64::from(image.height())) as f64
}

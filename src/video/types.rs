use std::fmt;
use std::path::PathBuf;

use image::{ImageBuffer, RgbImage};
use serde::{Deserialize, Serialize};

/// A displayable RGB frame
///
/// This is what the presentation layer draws: the current decoded frame of a
/// clip, or its load-time thumbnail.
#[derive(Clone, Debug)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        Self { buffer: ImageBuffer::new(width, height) }
    }

    /// Build a frame from packed RGB24 rows that may carry line padding
    ///
    /// Returns None when `data` is too short for `height` rows of `stride` bytes.
    pub fn from_strided_rgb(width: u32, height: u32, stride: usize, data: &[u8]) -> Option<Self> {
        let row_bytes = width as usize * 3;
        if stride < row_bytes || height == 0 {
            return None;
        }
        let needed = stride * (height as usize - 1) + row_bytes;
        if data.len() < needed {
            return None;
        }

        let mut packed = Vec::with_capacity(row_bytes * height as usize);
        for row in data.chunks(stride).take(height as usize) {
            packed.extend_from_slice(&row[..row_bytes]);
        }

        Self::from_rgb_bytes(width, height, packed)
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    /// Get the width of the frame
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    /// Get the height of the frame
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Get the underlying image buffer
    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Scale to `width` keeping the aspect ratio
    pub fn resized_to_width(&self, width: u32) -> Frame {
        use image::imageops::FilterType;

        let height = ((self.height() as u64 * width as u64) / self.width().max(1) as u64).max(1) as u32;
        Frame::new(image::imageops::resize(&self.buffer, width, height, FilterType::Lanczos3))
    }

    /// Save the frame as a PNG file
    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.buffer.save(path)
    }
}

/// Metadata of one video stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub codec_short: String,
    pub codec_long: String,
    pub codec_tag: String,
    pub bit_rate: i64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub pixel_format: String,
    pub language: Option<String>,
    pub title: Option<String>,
}

/// Metadata of one audio stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub codec_short: String,
    pub codec_long: String,
    pub codec_tag: String,
    pub bit_rate: i64,
    pub sample_rate: u32,
    pub channels: u16,
    pub language: Option<String>,
    pub title: Option<String>,
}

/// Metadata of one subtitle stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtitleStreamInfo {
    pub language: Option<String>,
    pub title: Option<String>,
}

/// Everything the info popup shows about an opened media file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovieInfo {
    pub filename: PathBuf,
    pub duration: f64,
    pub size: u64,
    pub bit_rate: i64,
    pub format_short: String,
    pub format_long: String,
    pub videos: Vec<VideoStreamInfo>,
    pub audios: Vec<AudioStreamInfo>,
    pub subs: Vec<SubtitleStreamInfo>,
}

fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0);
    let hours = (total / 3600.0).floor() as u64;
    let minutes = ((total % 3600.0) / 60.0).floor() as u64;
    let secs = total % 60.0;
    format!("{:02}:{:02}:{:06.3}", hours, minutes, secs)
}

fn push_tags(out: &mut fmt::Formatter<'_>, language: &Option<String>, title: &Option<String>) -> fmt::Result {
    if let Some(language) = language {
        writeln!(out, "    Language: {}", language)?;
    }
    if let Some(title) = title {
        writeln!(out, "    Title: {}", title)?;
    }
    Ok(())
}

impl fmt::Display for MovieInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.filename.display())?;
        writeln!(f, "Format: {} ({})", self.format_long, self.format_short)?;
        writeln!(f, "Duration: {}", format_clock(self.duration))?;
        writeln!(f, "Size: {:.2} MB", self.size as f64 / 1024.0 / 1024.0)?;
        writeln!(f, "Bitrate: {} kb/s", self.bit_rate / 1000)?;

        for (i, video) in self.videos.iter().enumerate() {
            writeln!(f, "Video #{}: {} ({})", i, video.codec_long, video.codec_short)?;
            writeln!(f, "    {}x{} @ {:.3} fps, {}", video.width, video.height, video.fps, video.pixel_format)?;
            if video.bit_rate > 0 {
                writeln!(f, "    Bitrate: {} kb/s", video.bit_rate / 1000)?;
            }
            push_tags(f, &video.language, &video.title)?;
        }

        for (i, audio) in self.audios.iter().enumerate() {
            writeln!(f, "Audio #{}: {} ({})", i, audio.codec_long, audio.codec_short)?;
            writeln!(f, "    {} Hz, {} channels", audio.sample_rate, audio.channels)?;
            if audio.bit_rate > 0 {
                writeln!(f, "    Bitrate: {} kb/s", audio.bit_rate / 1000)?;
            }
            push_tags(f, &audio.language, &audio.title)?;
        }

        for (i, sub) in self.subs.iter().enumerate() {
            writeln!(f, "Subtitles #{}", i)?;
            push_tags(f, &sub.language, &sub.title)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strided_rows_drop_padding() {
        // 2x2 image, 8 bytes per row (6 pixel bytes + 2 padding)
        let data = vec![
            1, 2, 3, 4, 5, 6, 99, 99,
            7, 8, 9, 10, 11, 12, 99, 99,
        ];
        let frame = Frame::from_strided_rgb(2, 2, 8, &data).unwrap();

        assert_eq!(frame.get_pixel(0, 0), [1, 2, 3]);
        assert_eq!(frame.get_pixel(1, 0), [4, 5, 6]);
        assert_eq!(frame.get_pixel(0, 1), [7, 8, 9]);
        assert_eq!(frame.get_pixel(1, 1), [10, 11, 12]);
    }

    #[test]
    fn test_strided_rows_reject_short_buffer() {
        assert!(Frame::from_strided_rgb(4, 4, 12, &[0u8; 20]).is_none());
        assert!(Frame::from_strided_rgb(4, 1, 8, &[0u8; 64]).is_none());
    }

    #[test]
    fn test_resize_keeps_aspect() {
        let frame = Frame::new_black(320, 240);
        let thumb = frame.resized_to_width(160);

        assert_eq!(thumb.width(), 160);
        assert_eq!(thumb.height(), 120);
    }

    #[test]
    fn test_info_display_lists_streams() {
        let info = MovieInfo {
            filename: PathBuf::from("clip.mp4"),
            duration: 3725.5,
            format_short: "mov,mp4".to_string(),
            format_long: "QuickTime / MOV".to_string(),
            videos: vec![VideoStreamInfo {
                codec_short: "h264".to_string(),
                codec_long: "H.264 / AVC".to_string(),
                width: 1920,
                height: 1080,
                fps: 25.0,
                language: Some("eng".to_string()),
                ..Default::default()
            }],
            audios: vec![AudioStreamInfo {
                codec_short: "aac".to_string(),
                sample_rate: 48000,
                channels: 2,
                ..Default::default()
            }],
            ..Default::default()
        };

        let text = info.to_string();
        assert!(text.contains("01:02:05.500"));
        assert!(text.contains("1920x1080"));
        assert!(text.contains("Language: eng"));
        assert!(text.contains("48000 Hz, 2 channels"));
    }
}

//! Cached pixel-format/size conversion.
//!
//! Building a swscale context is expensive, so each clip (for display) and
//! each render pass (for encoding) owns one `CachedScaler` that is rebuilt
//! only when the source or destination geometry/format changes.

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{Context as ScaleContext, Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;
use tracing::debug;

use crate::error::{ClipError, Result};

/// Identity of a conversion: both ends' dimensions and pixel formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleKey {
    pub src_width: u32,
    pub src_height: u32,
    pub src_format: Pixel,
    pub dst_width: u32,
    pub dst_height: u32,
    pub dst_format: Pixel,
}

impl ScaleKey {
    /// Key for converting `input` into the given destination geometry
    pub fn for_input(input: &VideoFrame, dst_width: u32, dst_height: u32, dst_format: Pixel) -> Self {
        Self {
            src_width: input.width(),
            src_height: input.height(),
            src_format: input.format(),
            dst_width,
            dst_height,
            dst_format,
        }
    }
}

/// A conversion context plus its output buffer, rebuilt on key change
pub struct CachedScaler {
    flags: Flags,
    key: Option<ScaleKey>,
    context: Option<ScaleContext>,
    output: VideoFrame,
    rebuilds: usize,
}

impl CachedScaler {
    pub fn new(flags: Flags) -> Self {
        Self {
            flags,
            key: None,
            context: None,
            output: VideoFrame::empty(),
            rebuilds: 0,
        }
    }

    /// Whether the cached context already matches `key`
    pub fn is_current(&self, key: &ScaleKey) -> bool {
        self.context.is_some() && self.key.as_ref() == Some(key)
    }

    /// How many times a context has been (re)built
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    /// Convert `input` to the destination geometry, reusing the context when possible
    pub fn scale(
        &mut self,
        input: &VideoFrame,
        dst_width: u32,
        dst_height: u32,
        dst_format: Pixel,
    ) -> Result<&mut VideoFrame> {
        let key = ScaleKey::for_input(input, dst_width, dst_height, dst_format);

        if !self.is_current(&key) {
            debug!(
                "Rebuilding scale context {}x{} {:?} -> {}x{} {:?}",
                key.src_width, key.src_height, key.src_format,
                key.dst_width, key.dst_height, key.dst_format
            );

            self.context = None;
            let context = ScaleContext::get(
                key.src_format,
                key.src_width,
                key.src_height,
                key.dst_format,
                key.dst_width,
                key.dst_height,
                self.flags,
            )
            .map_err(|e| ClipError::DecodeFailed {
                reason: format!("Failed to create scale context: {}", e),
            })?;

            self.context = Some(context);
            self.output = VideoFrame::new(dst_format, dst_width, dst_height);
            self.key = Some(key);
            self.rebuilds += 1;
        }

        let context = self.context.as_mut().ok_or_else(|| ClipError::DecodeFailed {
            reason: "Scale context missing".to_string(),
        })?;

        // An encoder may still reference the previous output; detach before overwriting
        if unsafe { ffmpeg::ffi::av_frame_make_writable(self.output.as_mut_ptr()) } < 0 {
            return Err(ClipError::DecodeFailed {
                reason: "Could not allocate a writable output frame".to_string(),
            }
            .into());
        }

        context
            .run(input, &mut self.output)
            .map_err(|e| ClipError::DecodeFailed {
                reason: format!("Pixel conversion failed: {}", e),
            })?;

        Ok(&mut self.output)
    }

    /// Drop the context and output buffer
    pub fn release(&mut self) {
        self.context = None;
        self.key = None;
        self.output = VideoFrame::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grey_frame(width: u32, height: u32) -> VideoFrame {
        let mut frame = VideoFrame::new(Pixel::YUV420P, width, height);
        for plane in 0..3 {
            frame.data_mut(plane).fill(128);
        }
        frame
    }

    #[test]
    fn test_context_reused_until_key_changes() {
        let mut scaler = CachedScaler::new(Flags::BILINEAR);
        let input = grey_frame(64, 48);

        scaler.scale(&input, 32, 24, Pixel::RGB24).unwrap();
        scaler.scale(&input, 32, 24, Pixel::RGB24).unwrap();
        assert_eq!(scaler.rebuilds(), 1);

        let output = scaler.scale(&input, 16, 12, Pixel::RGB24).unwrap();
        assert_eq!(output.width(), 16);
        assert_eq!(output.height(), 12);
        assert_eq!(scaler.rebuilds(), 2);

        let bigger = grey_frame(128, 96);
        scaler.scale(&bigger, 16, 12, Pixel::RGB24).unwrap();
        assert_eq!(scaler.rebuilds(), 3);
    }

    #[test]
    fn test_release_forces_rebuild() {
        let mut scaler = CachedScaler::new(Flags::BILINEAR);
        let input = grey_frame(32, 32);
        let key = ScaleKey::for_input(&input, 32, 32, Pixel::RGB24);

        scaler.scale(&input, 32, 32, Pixel::RGB24).unwrap();
        assert!(scaler.is_current(&key));

        scaler.release();
        assert!(!scaler.is_current(&key));
    }
}

//! # Source Clip Module
//!
//! Opens media files, seeks and decodes frames on demand and converts them
//! to displayable RGB images.

pub mod clip;
pub mod scaler;
pub mod types;

use std::sync::OnceLock;

use ffmpeg_next as ffmpeg;
use tracing::debug;

use crate::error::{EditorError, Result};

pub use clip::Clip;
pub use scaler::{CachedScaler, ScaleKey};
pub use types::{AudioStreamInfo, Frame, MovieInfo, SubtitleStreamInfo, VideoStreamInfo};

static FFMPEG_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize the FFmpeg libraries once per process
pub fn init() -> Result<()> {
    FFMPEG_INIT
        .get_or_init(|| {
            ffmpeg::init().map_err(|e| e.to_string())?;
            ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
            debug!("FFmpeg initialized");
            Ok(())
        })
        .clone()
        .map_err(|e| EditorError::generic(format!("FFmpeg initialization failed: {}", e)))
}

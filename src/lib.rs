//! # Reelcut
//!
//! The core of a timeline video editor: frame-accurate clip decoding, clips
//! arranged on a shared time axis, and multi-pass rendering to a new file.
//!
//! All container and codec work goes through FFmpeg (`ffmpeg-next`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reelcut::{
//!     composition::Composition,
//!     config::EditorConfig,
//!     render::RenderSpec,
//! };
//!
//! # fn main() -> reelcut::Result<()> {
//! let config = EditorConfig::default();
//! let mut composition = Composition::new(config.decode.clone());
//!
//! let id = composition.load("intro.mp4")?;
//! composition.goto_second_and_read(2.5, true, true)?;
//! if let Some(frame) = composition.image() {
//!     println!("Showing {}x{} at {:.2}s", frame.width(), frame.height(), composition.current());
//! }
//!
//! let spec = RenderSpec::from_movie_info(
//!     "export.mp4",
//!     composition.clip(id).unwrap().info(),
//!     &config.render,
//! );
//! composition.render(&spec)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`video`] - Source clips: open, seek, decode, metadata
//! - [`composition`] - Clips on a timeline, interval editing, playback pacing
//! - [`render`] - Encoding and muxing, two-pass, background jobs, previews
//! - [`config`] - Configuration management
//! - [`error`] - Error taxonomy

pub mod composition;
pub mod config;
pub mod error;
pub mod render;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{ClipId, Composition, Interval, TimelineSnapshot},
    config::EditorConfig,
    error::{EditorError, Result},
    render::{RenderJob, RenderReport, RenderSpec},
    video::{Clip, Frame, MovieInfo},
};

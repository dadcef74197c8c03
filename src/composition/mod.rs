//! # Composition
//!
//! Clips placed on a shared timeline, navigation that follows whichever clip
//! owns the current position, and the playback timer logic.

pub mod interval;
pub mod playback;
pub mod timeline;

// Re-exports for convenience
pub use interval::{ClipId, Interval, SnapshotClip, TimelineSnapshot};
pub use playback::{PlaybackGovernor, StopReason, TickDecision};
pub use timeline::Composition;

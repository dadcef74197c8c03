//! # Render
//!
//! Export of a composition to a new file: render specifications, the
//! compression preset table, one- and two-pass planning, the per-pass
//! encode/mux loop, background jobs and encoded previews.

pub mod audio_stream;
pub mod job;
pub mod pipeline;
pub mod presets;
pub mod preview;
pub mod spec;
pub mod two_pass;
pub mod video_stream;

// Re-exports for convenience
pub use job::RenderJob;
pub use pipeline::{PassReport, RenderControl, RenderProgress, RenderReport};
pub use presets::{CodecFamily, PassRole};
pub use preview::{render_preview, Preview};
pub use spec::{AudioOutput, RateControl, RenderSegment, RenderSpec, VideoOutput};
pub use two_pass::{PassPlan, StatsLog};

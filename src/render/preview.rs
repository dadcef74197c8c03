//! Encoded preview: render a short snippet at the current position with the
//! configured export settings and load the result back, so the encoded frame
//! can be shown next to the source frame.

use tempfile::TempPath;
use tracing::info;

use crate::composition::Composition;
use crate::config::EditorConfig;
use crate::error::{Result, TimelineError};
use crate::video::Clip;
use super::pipeline::{self, RenderControl};
use super::spec::{RenderSegment, RenderSpec};

/// A rendered snippet; the temporary file is removed when this is dropped
pub struct Preview {
    clip: Clip,
    path: TempPath,
}

impl Preview {
    pub fn clip(&self) -> &Clip {
        &self.clip
    }

    pub fn clip_mut(&mut self) -> &mut Clip {
        &mut self.clip
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

/// File extension matching a muxer name
fn extension_for(container: &str) -> &str {
    match container {
        "matroska" => "mkv",
        "mpegts" => "ts",
        "mpeg" => "mpg",
        other => other,
    }
}

/// Render `config.preview.segment_seconds` starting at the composition's position
///
/// The render runs against a private copy, so `composition` keeps its cursor.
pub fn render_preview(composition: &Composition, config: &EditorConfig) -> Result<Preview> {
    let source = composition
        .current_interval()
        .or_else(|| composition.effective_intervals().first().copied())
        .and_then(|interval| composition.clip(interval.clip))
        .ok_or(TimelineError::Empty)?;

    let container = &config.preview.container;
    let path = tempfile::Builder::new()
        .prefix("reelcut-preview-")
        .suffix(&format!(".{}", extension_for(container)))
        .tempfile()?
        .into_temp_path();

    let mut spec = RenderSpec::from_movie_info(&path, source.info(), &config.render);
    spec.container = container.clone();
    spec.segment = Some(RenderSegment {
        start: composition.current(),
        max_duration: config.preview.segment_seconds,
    });

    let mut private = Composition::from_snapshot(&composition.snapshot(), &config.decode)?;
    pipeline::render(&mut private, &spec, &RenderControl::default())?;
    private.dispose();

    let clip = Clip::load(&path, &config.decode)?;
    info!("🔍 Preview ready: {:.2}s at {:.3}s", clip.duration(), composition.current());

    Ok(Preview { clip, path })
}

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::composition::{Composition, TimelineSnapshot};
use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use super::pipeline::{self, RenderControl, RenderProgress, RenderReport};
use super::spec::RenderSpec;

/// A render running on a blocking worker against its own copy of the timeline
///
/// The caller's composition stays usable while the job runs; the worker
/// reopens every clip from the snapshot.
pub struct RenderJob {
    handle: JoinHandle<Result<RenderReport>>,
    control: RenderControl,
    progress: watch::Receiver<RenderProgress>,
}

impl RenderJob {
    /// Start rendering `snapshot`; must be called from within a tokio runtime
    pub fn spawn(snapshot: TimelineSnapshot, spec: RenderSpec, config: EditorConfig) -> Self {
        let (sender, progress) = watch::channel(RenderProgress::default());
        let control = RenderControl::new(Arc::new(AtomicBool::new(false)), Some(sender));
        let worker_control = control.clone();

        info!("🚀 Starting render job for {}", spec.path.display());

        let handle = tokio::task::spawn_blocking(move || {
            let mut composition = Composition::from_snapshot(&snapshot, &config.decode)?;
            pipeline::render(&mut composition, &spec, &worker_control)
        });

        Self {
            handle,
            control,
            progress,
        }
    }

    /// Ask the worker to stop at its next loop iteration
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Progress updates; the latest value is always available
    pub fn progress(&self) -> watch::Receiver<RenderProgress> {
        self.progress.clone()
    }

    /// Wait for the worker and hand back its result
    pub async fn wait(self) -> Result<RenderReport> {
        self.handle
            .await
            .map_err(|e| EditorError::generic(format!("Render worker failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderDefaults;

    #[tokio::test]
    async fn test_empty_timeline_job_fails() {
        let dir = tempfile::tempdir().unwrap();
        let spec = RenderSpec::from_defaults(dir.path().join("out.mp4"), &RenderDefaults::default(), 320, 240, 25.0);

        let job = RenderJob::spawn(TimelineSnapshot::default(), spec, EditorConfig::default());
        let err = job.wait().await.unwrap_err();

        assert!(matches!(err, EditorError::Timeline(_)));
    }

    #[tokio::test]
    async fn test_missing_clip_job_fails() {
        let dir = tempfile::tempdir().unwrap();
        let spec = RenderSpec::from_defaults(dir.path().join("out.mp4"), &RenderDefaults::default(), 320, 240, 25.0);
        let snapshot = TimelineSnapshot::sequential(&[(dir.path().join("missing.mkv"), 3.0)]);

        let job = RenderJob::spawn(snapshot, spec, EditorConfig::default());
        assert!(job.wait().await.is_err());
    }
}

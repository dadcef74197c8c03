use std::path::Path;

use ffmpeg_next::util::frame::video::Video as VideoFrame;
use tracing::{debug, info, warn};

use crate::config::DecodeConfig;
use crate::error::{Result, TimelineError};
use crate::render::{pipeline, RenderControl, RenderReport, RenderSpec};
use crate::video::{Clip, Frame};
use super::interval::{
    check_layout, close_gaps, find_covering, preview_insert, ClipId, Interval, SnapshotClip,
    TimelineSnapshot, TIME_EPSILON,
};

struct ClipEntry {
    id: ClipId,
    clip: Clip,
}

/// Source clips placed on a shared time axis
///
/// Navigation is delegated to the clip owning the current position, then the
/// composition re-reads that clip's cursor into its own `current`. With no
/// intervals the most recently loaded clip covers `[0, duration)` on its own;
/// positions covered by no interval are gaps and show black.
pub struct Composition {
    config: DecodeConfig,
    /// Most recently loaded first
    clips: Vec<ClipEntry>,
    intervals: Vec<Interval>,
    current: f64,
    duration: f64,
    next_id: u64,
    /// Interval whose clip is positioned on `current`; None in a gap
    cursor: Option<Interval>,
    gap_fps: Option<f64>,
}

impl Composition {
    pub fn new(config: DecodeConfig) -> Self {
        Self {
            config,
            clips: Vec::new(),
            intervals: Vec::new(),
            current: 0.0,
            duration: 0.0,
            next_id: 1,
            cursor: None,
            gap_fps: None,
        }
    }

    /// Rebuild a private composition from a snapshot, reopening every clip
    pub fn from_snapshot(snapshot: &TimelineSnapshot, config: &DecodeConfig) -> Result<Self> {
        let mut composition = Self::new(config.clone());

        for entry in snapshot.clips.iter().rev() {
            let clip = Clip::load(&entry.path, config)?;
            composition.next_id = composition.next_id.max(entry.id.0 + 1);
            composition.clips.insert(0, ClipEntry { id: entry.id, clip });
        }

        if snapshot.intervals.is_empty() {
            composition.refresh_duration();
        } else {
            composition.commit_intervals(snapshot.intervals.clone())?;
        }

        if composition.is_loaded() {
            composition.position_at(snapshot.position, true, true)?;
        }

        Ok(composition)
    }

    /// Plain-data copy of the clip list, intervals and position
    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            position: self.current,
            clips: self
                .clips
                .iter()
                .map(|entry| SnapshotClip {
                    id: entry.id,
                    path: entry.clip.path().to_path_buf(),
                })
                .collect(),
            intervals: self.intervals.clone(),
        }
    }

    /// True once at least one clip is loaded
    pub fn is_loaded(&self) -> bool {
        !self.clips.is_empty()
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|entry| entry.id == id).map(|entry| &entry.clip)
    }

    fn clip_mut(&mut self, id: ClipId) -> Result<&mut Clip> {
        self.clips
            .iter_mut()
            .find(|entry| entry.id == id)
            .map(|entry| &mut entry.clip)
            .ok_or_else(|| TimelineError::UnknownClip { id: id.0 }.into())
    }

    /// Clips in composition order, most recently loaded first
    pub fn clips(&self) -> impl Iterator<Item = (ClipId, &Clip)> {
        self.clips.iter().map(|entry| (entry.id, &entry.clip))
    }

    /// The committed interval list
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Intervals as laid out on the ruler, including the implicit single-clip one
    pub fn effective_intervals(&self) -> Vec<Interval> {
        match (self.intervals.is_empty(), self.clips.first()) {
            (true, Some(front)) => vec![Interval::new(front.id, 0.0, front.clip.duration())],
            _ => self.intervals.clone(),
        }
    }

    /// Interval covering `current`, or None in a gap
    pub fn current_interval(&self) -> Option<Interval> {
        let layout = self.effective_intervals();
        find_covering(&layout, self.current).map(|i| layout[i])
    }

    /// Override the stepping rate used inside gaps
    pub fn set_gap_fps(&mut self, fps: Option<f64>) {
        self.gap_fps = fps.filter(|fps| *fps > 0.0);
    }

    fn gap_fps(&self) -> f64 {
        self.gap_fps
            .or_else(|| {
                self.effective_intervals()
                    .first()
                    .and_then(|interval| self.clip(interval.clip))
                    .map(|clip| clip.fps())
            })
            .unwrap_or(self.config.fallback_fps)
    }

    fn refresh_duration(&mut self) {
        self.duration = match (self.intervals.last(), self.clips.first()) {
            (Some(last), _) => last.absolute_end(),
            (None, Some(front)) => front.clip.duration(),
            (None, None) => 0.0,
        };
        self.current = self.current.clamp(0.0, self.duration);
    }

    /// Re-seat the cursor after the layout changed
    fn resettle(&mut self) {
        self.cursor = None;
        self.refresh_duration();
        if self.is_loaded() {
            let position = self.current;
            if let Err(e) = self.position_at(position, true, true) {
                warn!("Could not reposition at {:.3}s after edit: {}", position, e);
            }
        }
    }

    /// Open `path` and put it at the front of the clip list
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<ClipId> {
        let clip = Clip::load(path.as_ref(), &self.config)?;
        let id = ClipId(self.next_id);
        self.next_id += 1;

        let current = clip.current();
        let duration = clip.duration();
        self.clips.insert(0, ClipEntry { id, clip });

        if self.intervals.is_empty() {
            self.duration = duration;
            self.current = current;
            self.cursor = Some(Interval::new(id, 0.0, duration));
        }

        info!("Added clip {} ({} clips loaded)", id, self.clips.len());
        Ok(id)
    }

    /// Seek the clip owning `t`; in a gap only the position moves
    fn position_at(&mut self, t: f64, decode: bool, accurate: bool) -> Result<bool> {
        if !self.is_loaded() || !t.is_finite() {
            return Ok(false);
        }

        let t = t.clamp(0.0, self.duration);
        let layout = self.effective_intervals();
        let covering = find_covering(&layout, t).or_else(|| {
            // The very end belongs to the last interval's last frame
            layout
                .last()
                .filter(|last| (last.absolute_end() - t).abs() < TIME_EPSILON)
                .map(|_| layout.len() - 1)
        });

        match covering {
            Some(index) => {
                let interval = layout[index];
                let clip_time = interval.clip_time(t).min(interval.clip_offset + interval.duration);
                let clip = self.clip_mut(interval.clip)?;
                let ok = clip.goto_second_and_read(clip_time, decode, accurate)?;
                let clip_current = clip.current();

                self.cursor = Some(interval);
                self.current = interval
                    .timeline_time(clip_current)
                    .clamp(interval.absolute_start, self.duration);
                Ok(ok)
            }
            None => {
                debug!("Position {:.3}s is in a gap", t);
                self.cursor = None;
                self.current = t;
                Ok(true)
            }
        }
    }

    /// Move to `t` unless it is past the end
    fn enter(&mut self, t: f64, decode: bool) -> Result<bool> {
        if t >= self.duration - TIME_EPSILON {
            return Ok(false);
        }
        self.position_at(t, decode, true)
    }

    fn step(&mut self, decode: bool) -> Result<bool> {
        if !self.is_loaded() {
            return Ok(false);
        }

        match self.cursor {
            Some(interval) => {
                let clip = self.clip_mut(interval.clip)?;
                let advanced = if decode {
                    clip.read_and_decode_frame()?
                } else {
                    clip.skip_frame()?
                };
                let next = interval.timeline_time(clip.current());
                let half_period = clip.frame_period() / 2.0;

                if advanced && next < interval.absolute_end() - half_period {
                    self.current = next;
                    return Ok(true);
                }
                self.enter(interval.absolute_end(), decode)
            }
            None => {
                let mut next = self.current + 1.0 / self.gap_fps();
                let upcoming = self
                    .effective_intervals()
                    .iter()
                    .map(|interval| interval.absolute_start)
                    .find(|&start| start > self.current + TIME_EPSILON && start < next);
                if let Some(start) = upcoming {
                    next = start;
                }
                self.enter(next, decode)
            }
        }
    }

    /// Jump to `seconds` on the timeline
    pub fn goto_second_and_read(&mut self, seconds: f64, decode: bool, accurate: bool) -> Result<bool> {
        self.position_at(seconds, decode, accurate)
    }

    pub fn goto_ratio_and_read(&mut self, ratio: f64) -> Result<bool> {
        let target = ratio.clamp(0.0, 1.0) * self.duration;
        self.position_at(target, true, true)
    }

    /// Advance one frame and decode it; false at the end of the composition
    pub fn read_and_decode_frame(&mut self) -> Result<bool> {
        self.step(true)
    }

    /// Advance one frame without converting it; false at the end
    pub fn skip_frame(&mut self) -> Result<bool> {
        self.step(false)
    }

    /// Step back `frames` frames; refused before time 0
    pub fn go_back(&mut self, frames: u32) -> Result<bool> {
        if !self.is_loaded() {
            return Ok(false);
        }

        let period = match self.cursor.and_then(|interval| self.clip(interval.clip)) {
            Some(clip) => clip.frame_period(),
            None => 1.0 / self.gap_fps(),
        };
        let target = self.current - frames as f64 * period;
        if target < -period / 2.0 {
            return Ok(false);
        }

        match self.cursor {
            Some(interval) if target >= interval.absolute_start - period / 2.0 => {
                let clip = self.clip_mut(interval.clip)?;
                let ok = clip.go_back(frames)?;
                let clip_current = clip.current();
                self.current = interval.timeline_time(clip_current).max(interval.absolute_start);
                Ok(ok)
            }
            _ => self.position_at(target.max(0.0), true, true),
        }
    }

    /// Convert the current frame for display
    pub fn decode_frame(&mut self) -> Result<bool> {
        if !self.is_loaded() {
            return Ok(false);
        }
        match self.cursor {
            Some(interval) => self.clip_mut(interval.clip)?.decode_frame(),
            None => Ok(true),
        }
    }

    /// Display image at the current position; None in a gap
    pub fn image(&self) -> Option<&Frame> {
        self.cursor
            .and_then(|interval| self.clip(interval.clip))
            .and_then(|clip| clip.image())
    }

    /// Native frame at the current position; None in a gap
    pub fn current_raw_frame(&self) -> Option<&VideoFrame> {
        self.cursor
            .and_then(|interval| self.clip(interval.clip))
            .and_then(|clip| clip.raw_frame())
    }

    /// Candidate interval placing the whole clip `id` at `absolute_start`
    pub fn interval_for(&self, id: ClipId, absolute_start: f64) -> Result<Interval> {
        let clip = self.clip(id).ok_or(TimelineError::UnknownClip { id: id.0 })?;
        Ok(Interval::new(id, absolute_start, clip.duration()))
    }

    /// The interval list that dropping `candidate` would produce
    pub fn preview_insert_interval(&self, candidate: Interval) -> Result<Vec<Interval>> {
        if self.clip(candidate.clip).is_none() {
            return Err(TimelineError::UnknownClip { id: candidate.clip.0 }.into());
        }
        preview_insert(&self.intervals, candidate)
    }

    /// Atomically replace the live interval list
    pub fn commit_intervals(&mut self, intervals: Vec<Interval>) -> Result<()> {
        check_layout(&intervals)?;
        if let Some(unknown) = intervals.iter().find(|interval| self.clip(interval.clip).is_none()) {
            return Err(TimelineError::UnknownClip { id: unknown.clip.0 }.into());
        }

        debug!("Committing {} intervals", intervals.len());
        self.intervals = intervals;
        self.resettle();
        Ok(())
    }

    /// Dispose clip `id` and drop every interval bound to it
    pub fn remove_clip(&mut self, id: ClipId) -> Result<()> {
        let index = self
            .clips
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(TimelineError::UnknownClip { id: id.0 })?;

        let mut entry = self.clips.remove(index);
        entry.clip.dispose();
        self.intervals.retain(|interval| interval.clip != id);

        info!("Removed clip {} ({} clips left)", id, self.clips.len());
        self.resettle();
        Ok(())
    }

    /// Shift intervals left until no gaps remain
    pub fn remove_gaps(&mut self) {
        close_gaps(&mut self.intervals);
        self.resettle();
    }

    /// Split the interval covering `t` into two abutting intervals
    ///
    /// Returns false when `t` is in a gap or on an interval boundary.
    pub fn split_at(&mut self, t: f64) -> Result<bool> {
        let layout = self.effective_intervals();
        let Some(index) = find_covering(&layout, t) else {
            return Ok(false);
        };

        let interval = layout[index];
        if t <= interval.absolute_start + TIME_EPSILON || t >= interval.absolute_end() - TIME_EPSILON {
            return Ok(false);
        }

        let (head, tail) = interval.split(t);
        let mut intervals = layout;
        intervals[index] = head;
        intervals.insert(index + 1, tail);

        debug!("Split {} at {:.3}s", interval.clip, t);
        self.intervals = intervals;
        self.resettle();
        Ok(true)
    }

    /// Export through the render pipeline
    pub fn render(&mut self, spec: &RenderSpec) -> Result<RenderReport> {
        pipeline::render(self, spec, &RenderControl::default())
    }

    /// Dispose every clip and return to the empty state
    pub fn dispose(&mut self) {
        for entry in &mut self.clips {
            entry.clip.dispose();
        }
        self.clips.clear();
        self.intervals.clear();
        self.cursor = None;
        self.current = 0.0;
        self.duration = 0.0;
    }
}

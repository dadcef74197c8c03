use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TimelineError};

/// Tolerance for comparing timeline positions, well below one frame period
pub const TIME_EPSILON: f64 = 1e-6;

/// Stable identifier of a clip inside one composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipId(pub u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Placement of (part of) one clip on the composition's time axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub clip: ClipId,
    /// Position on the timeline where the interval begins
    pub absolute_start: f64,
    /// Position inside the clip shown at `absolute_start`
    pub clip_offset: f64,
    pub duration: f64,
}

impl Interval {
    /// Interval showing a whole clip from its beginning
    pub fn new(clip: ClipId, absolute_start: f64, duration: f64) -> Self {
        Self {
            clip,
            absolute_start,
            clip_offset: 0.0,
            duration,
        }
    }

    pub fn absolute_end(&self) -> f64 {
        self.absolute_start + self.duration
    }

    /// Whether `[absolute_start, absolute_end)` contains `t`
    pub fn contains(&self, t: f64) -> bool {
        t >= self.absolute_start - TIME_EPSILON && t < self.absolute_end() - TIME_EPSILON
    }

    /// Clip time displayed at timeline position `t`
    pub fn clip_time(&self, t: f64) -> f64 {
        self.clip_offset + (t - self.absolute_start)
    }

    /// Timeline position showing clip time `clip_time`
    pub fn timeline_time(&self, clip_time: f64) -> f64 {
        self.absolute_start + (clip_time - self.clip_offset)
    }

    fn shifted(&self, by: f64) -> Self {
        Self {
            absolute_start: self.absolute_start + by,
            ..*self
        }
    }

    /// Cut at timeline position `t`, returning the head and the tail
    pub fn split(&self, t: f64) -> (Self, Self) {
        let head_len = t - self.absolute_start;
        let head = Self {
            duration: head_len,
            ..*self
        };
        let tail = Self {
            absolute_start: t,
            clip_offset: self.clip_offset + head_len,
            duration: self.duration - head_len,
            ..*self
        };
        (head, tail)
    }
}

/// Index of the interval covering `t`, if any
pub fn find_covering(intervals: &[Interval], t: f64) -> Option<usize> {
    intervals.iter().position(|interval| interval.contains(t))
}

/// Check the live-list invariants: sorted by start, pairwise disjoint,
/// non-negative starts and positive durations
pub fn check_layout(intervals: &[Interval]) -> Result<()> {
    for interval in intervals {
        if interval.absolute_start < -TIME_EPSILON || interval.duration <= TIME_EPSILON {
            return Err(TimelineError::InvalidPlacement {
                start: interval.absolute_start,
            }
            .into());
        }
    }

    for pair in intervals.windows(2) {
        if pair[1].absolute_start < pair[0].absolute_end() - TIME_EPSILON {
            return Err(TimelineError::InvalidPlacement {
                start: pair[1].absolute_start,
            }
            .into());
        }
    }

    Ok(())
}

/// Compute the interval list that results from inserting `candidate`
///
/// Ripple insert: intervals starting at or after the candidate move right by
/// its duration. An interval the candidate lands inside is cut at the
/// candidate's start and its remainder resumes right after the candidate.
/// The live list is not touched.
pub fn preview_insert(live: &[Interval], candidate: Interval) -> Result<Vec<Interval>> {
    check_layout(std::slice::from_ref(&candidate))?;

    let at = candidate.absolute_start;
    let shift = candidate.duration;
    let mut result = Vec::with_capacity(live.len() + 2);

    for interval in live {
        if interval.absolute_end() <= at + TIME_EPSILON {
            result.push(*interval);
        } else if interval.absolute_start >= at - TIME_EPSILON {
            result.push(interval.shifted(shift));
        } else {
            let (head, tail) = interval.split(at);
            result.push(head);
            result.push(tail.shifted(shift));
        }
    }

    result.push(candidate);
    result.sort_by(|a, b| a.absolute_start.total_cmp(&b.absolute_start));
    Ok(result)
}

/// Pack intervals end to end from time 0, preserving their order
pub fn close_gaps(intervals: &mut [Interval]) {
    let mut cursor = 0.0;
    for interval in intervals.iter_mut() {
        interval.absolute_start = cursor;
        cursor += interval.duration;
    }
}

/// One clip entry of a saved timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotClip {
    pub id: ClipId,
    pub path: PathBuf,
}

/// Plain-data copy of a composition, used to rebuild a private instance
/// on another thread or in another process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineSnapshot {
    pub position: f64,
    /// Clips in composition order (most recently loaded first)
    pub clips: Vec<SnapshotClip>,
    pub intervals: Vec<Interval>,
}

impl TimelineSnapshot {
    /// Timeline with `paths` placed end to end, given each clip's duration
    pub fn sequential(paths: &[(PathBuf, f64)]) -> Self {
        let mut snapshot = Self::default();
        let mut cursor = 0.0;

        for (i, (path, duration)) in paths.iter().enumerate() {
            let id = ClipId(i as u64 + 1);
            snapshot.clips.insert(0, SnapshotClip { id, path: path.clone() });
            snapshot.intervals.push(Interval::new(id, cursor, *duration));
            cursor += duration;
        }

        snapshot
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| crate::error::EditorError::generic(format!("Failed to serialize timeline: {}", e)))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| crate::error::EditorError::generic(format!("Failed to parse timeline: {}", e)))
    }
}

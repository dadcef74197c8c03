//! Self-pacing playback timer logic.
//!
//! Each tick decodes exactly one frame; the next tick is scheduled after the
//! frame period minus the time the decode took. The presentation layer owns
//! the actual timer and calls [`PlaybackGovernor::tick`] from it.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::PlaybackConfig;
use crate::error::Result;

/// Why playback stopped on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    TooManyFailures,
}

/// What the timer should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    /// Fire again after this delay
    Continue(Duration),
    Stop(StopReason),
}

pub struct PlaybackGovernor {
    frame_period: Duration,
    min_tick: Duration,
    max_failures: u32,
    consecutive_failures: u32,
}

impl PlaybackGovernor {
    pub fn new(fps: f64, config: &PlaybackConfig) -> Self {
        let fps = if fps > 0.0 { fps } else { 25.0 };
        Self {
            frame_period: Duration::from_secs_f64(1.0 / fps),
            min_tick: Duration::from_millis(config.min_tick_ms.max(1)),
            max_failures: config.max_consecutive_failures.max(1),
            consecutive_failures: 0,
        }
    }

    /// Delay until the next tick when the last one took `elapsed`
    pub fn next_delay(&self, elapsed: Duration) -> Duration {
        self.frame_period.saturating_sub(elapsed).max(self.min_tick)
    }

    /// Run one tick's decode step and decide whether to keep playing
    pub fn tick<F>(&mut self, step: F) -> TickDecision
    where
        F: FnOnce() -> Result<bool>,
    {
        let started = Instant::now();
        let outcome = step();
        self.decide(outcome, started.elapsed())
    }

    fn decide(&mut self, outcome: Result<bool>, elapsed: Duration) -> TickDecision {
        match outcome {
            Ok(true) => {
                self.consecutive_failures = 0;
                TickDecision::Continue(self.next_delay(elapsed))
            }
            Ok(false) => {
                debug!("Playback reached the end");
                TickDecision::Stop(StopReason::EndOfStream)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "Playback tick failed ({}/{}): {}",
                    self.consecutive_failures, self.max_failures, e
                );
                if self.consecutive_failures >= self.max_failures {
                    TickDecision::Stop(StopReason::TooManyFailures)
                } else {
                    TickDecision::Continue(self.next_delay(elapsed))
                }
            }
        }
    }
}

//! Pass planning for one- and two-pass encodes.
//!
//! The analysis pass only collects rate-control statistics. Its statistics
//! text is handed unchanged to the final pass, which is the only pass that
//! writes audio.

use super::presets::PassRole;

/// What one encoding pass does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassPlan {
    /// The only pass of a one-pass render
    Single,
    /// First of two passes: collect statistics
    Analyze,
    /// Second of two passes: consume the analysis statistics
    Final { stats: String },
}

impl PassPlan {
    /// Plan for pass `pass` (1-based) of `passes`, given the statistics
    /// collected so far
    pub fn for_pass(pass: u8, passes: u8, stats: String) -> Self {
        match (passes, pass) {
            (0..=1, _) => Self::Single,
            (_, 1) => Self::Analyze,
            _ => Self::Final { stats },
        }
    }

    pub fn role(&self) -> PassRole {
        match self {
            Self::Single => PassRole::Single,
            Self::Analyze => PassRole::Analyze,
            Self::Final { .. } => PassRole::Final,
        }
    }

    /// Whether the encoder should emit statistics
    pub fn collects_stats(&self) -> bool {
        matches!(self, Self::Analyze)
    }

    /// Statistics the encoder should read back, if any
    pub fn stats_in(&self) -> Option<&str> {
        match self {
            Self::Final { stats } => Some(stats),
            _ => None,
        }
    }

    /// Audio is encoded once, on the pass that produces the output
    pub fn writes_audio(&self) -> bool {
        !matches!(self, Self::Analyze)
    }
}

/// Statistics text accumulated packet by packet
#[derive(Debug, Default, Clone)]
pub struct StatsLog {
    text: String,
    chunks: usize,
}

impl StatsLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        if !chunk.is_empty() {
            self.text.push_str(chunk);
            self.chunks += 1;
        }
    }

    /// Push what an encoder left in its statistics buffer once fully flushed
    ///
    /// Encoders that publish per packet still hold their last chunk at that
    /// point; it is not appended twice.
    pub fn push_final(&mut self, chunk: &str) {
        if !self.text.ends_with(chunk) {
            self.push(chunk);
        }
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

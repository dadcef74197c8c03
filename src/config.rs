use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for reelcut
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Clip decoding settings
    pub decode: DecodeConfig,

    /// Interactive playback settings
    pub playback: PlaybackConfig,

    /// Defaults for export renders
    pub render: RenderDefaults,

    /// Encoded preview settings
    pub preview: PreviewConfig,
}

impl EditorConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: EditorConfig = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.decode.validate()?;
        self.playback.validate()?;
        self.render.validate()?;
        self.preview.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Source clip decoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Forward distance (seconds) beyond which a native seek beats skipping frames
    pub seek_ahead_threshold: f64,

    /// Width of the load-time thumbnail; height follows the aspect ratio
    pub thumbnail_width: u32,

    /// Frame rate assumed when a stream does not report one
    pub fallback_fps: f64,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            seek_ahead_threshold: 2.0,
            thumbnail_width: 160,
            fallback_fps: 25.0,
        }
    }
}

impl DecodeConfig {
    fn validate(&self) -> Result<()> {
        if !(self.seek_ahead_threshold >= 0.0) {
            return Err(invalid("decode.seek_ahead_threshold", self.seek_ahead_threshold).into());
        }

        if self.thumbnail_width == 0 {
            return Err(invalid("decode.thumbnail_width", self.thumbnail_width).into());
        }

        if !(self.fallback_fps > 0.0) {
            return Err(invalid("decode.fallback_fps", self.fallback_fps).into());
        }

        Ok(())
    }
}

/// Playback timer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Failed ticks in a row before playback stops itself
    pub max_consecutive_failures: u32,

    /// Lower clamp for the delay between two ticks (milliseconds)
    pub min_tick_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            min_tick_ms: 1,
        }
    }
}

impl PlaybackConfig {
    fn validate(&self) -> Result<()> {
        if self.max_consecutive_failures == 0 {
            return Err(invalid("playback.max_consecutive_failures", self.max_consecutive_failures).into());
        }
        Ok(())
    }
}

/// Defaults used to fill in a render specification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// Container short name (muxer), e.g. "mp4", "matroska", "avi"
    pub container: String,

    /// Video encoder short name, e.g. "libx264", "mpeg4", "libvpx"
    pub codec: String,

    /// Target bitrate in kbit/s when no CRF is given
    pub bitrate_kbps: u32,

    /// Constant quality value; takes precedence over the bitrate
    pub crf: Option<u32>,

    /// Maximum distance between key frames
    pub gop: u32,

    /// Compression preset, 1 (slowest, best) to 10 (fastest)
    pub preset: u8,

    /// Number of encoding passes (1 or 2)
    pub passes: u8,

    /// Audio encoder short name; None uses the container's default codec
    pub audio_codec: Option<String>,

    /// Encoder worker threads; 0 picks one per CPU core
    pub encoder_threads: usize,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            container: "mp4".to_string(),
            codec: "libx264".to_string(),
            bitrate_kbps: 2000,
            crf: None,
            gop: 12,
            preset: 5,
            passes: 1,
            audio_codec: None,
            encoder_threads: 0,
        }
    }
}

impl RenderDefaults {
    fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.preset) {
            return Err(invalid("render.preset", self.preset).into());
        }

        if !(1..=2).contains(&self.passes) {
            return Err(invalid("render.passes", self.passes).into());
        }

        if self.gop == 0 {
            return Err(invalid("render.gop", self.gop).into());
        }

        if self.crf.is_none() && self.bitrate_kbps == 0 {
            return Err(invalid("render.bitrate_kbps", self.bitrate_kbps).into());
        }

        Ok(())
    }

    /// Resolve `encoder_threads`, turning 0 into the CPU count
    pub fn resolved_threads(&self) -> usize {
        if self.encoder_threads == 0 {
            num_cpus::get()
        } else {
            self.encoder_threads
        }
    }
}

/// Encoded preview configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Length of the encoded preview snippet in seconds
    pub segment_seconds: f64,

    /// Container used for the temporary preview file
    pub container: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            segment_seconds: 2.0,
            container: "matroska".to_string(),
        }
    }
}

impl PreviewConfig {
    fn validate(&self) -> Result<()> {
        if !(self.segment_seconds > 0.0) {
            return Err(invalid("preview.segment_seconds", self.segment_seconds).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = EditorConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("reelcut.toml");

        let mut original = EditorConfig::default();
        original.render.codec = "mpeg4".to_string();
        original.render.crf = Some(23);

        original.save_to_file(&file_path).unwrap();
        let loaded = EditorConfig::from_file(&file_path).unwrap();

        assert_eq!(loaded.render.codec, "mpeg4");
        assert_eq!(loaded.render.crf, Some(23));
        assert_eq!(loaded.decode.thumbnail_width, original.decode.thumbnail_width);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[render]\npasses = 2\n").unwrap();

        let loaded = EditorConfig::from_file(&file_path).unwrap();
        assert_eq!(loaded.render.passes, 2);
        assert_eq!(loaded.render.container, "mp4");
        assert_eq!(loaded.playback.max_consecutive_failures, 3);
    }

    #[test]
    fn test_invalid_preset_rejected() {
        let mut config = EditorConfig::default();
        config.render.preset = 11;
        assert!(config.validate().is_err());

        config.render.preset = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_pass_count_rejected() {
        let mut config = EditorConfig::default();
        config.render.passes = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_reports_not_found() {
        let result = EditorConfig::from_file("/definitely/not/here.toml");
        assert!(matches!(
            result,
            Err(crate::error::EditorError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}

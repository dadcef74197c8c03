use thiserror::Error;

/// Main error type for the reelcut library
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Clip error: {0}")]
    Clip(#[from] ClipError),

    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Source clip errors (open, seek, decode)
#[derive(Error, Debug)]
pub enum ClipError {
    #[error("Failed to load media file: {path} ({reason})")]
    LoadFailed { path: String, reason: String },

    #[error("No decodable video stream in: {path}")]
    NoVideoStream { path: String },

    #[error("No decoder available for codec: {codec}")]
    DecoderUnavailable { codec: String },

    #[error("Seek to {target:.3}s failed: {reason}")]
    SeekFailed { target: f64, reason: String },

    #[error("Frame decoding failed: {reason}")]
    DecodeFailed { reason: String },

    #[error("Clip is not loaded")]
    NotLoaded,
}

/// Composition/interval errors
#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Composition has no clips")]
    Empty,

    #[error("Unknown clip id: {id}")]
    UnknownClip { id: u64 },

    #[error("Invalid interval placement at {start:.3}s")]
    InvalidPlacement { start: f64 },
}

/// Render pipeline errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Invalid render specification: {details}")]
    InvalidSpec { details: String },

    #[error("Unsupported codec: {codec}")]
    UnsupportedCodec { codec: String },

    #[error("Unsupported container: {container}")]
    UnsupportedContainer { container: String },

    #[error("Could not open encoder {codec}: {reason}")]
    EncoderOpenFailed { codec: String, reason: String },

    #[error("Writing output failed: {reason}")]
    WriteFailed { reason: String },

    #[error("Render cancelled")]
    Cancelled,
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using EditorError
pub type Result<T> = std::result::Result<T, EditorError>;

impl EditorError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Whether this is a cooperative cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Render(RenderError::Cancelled))
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Clip(ClipError::LoadFailed { path, .. })
            | Self::Clip(ClipError::NoVideoStream { path }) => {
                format!("Could not open '{}'. Please check the file exists and contains a supported video stream.", path)
            }
            Self::Render(RenderError::UnsupportedCodec { codec }) => {
                format!("The codec '{}' is not available in this FFmpeg build.", codec)
            }
            Self::Render(RenderError::WriteFailed { reason }) => {
                format!("Rendering stopped while writing the output file ({}). The partial file was left on disk.", reason)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

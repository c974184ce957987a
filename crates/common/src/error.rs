//! Error types shared across AlphaPlay crates.

use crate::role::StreamRole;

/// Top-level error type for AlphaPlay operations.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Failed to load {stream} source: {message}")]
    LoadFailed { stream: StreamRole, message: String },

    #[error("Timed out loading {stream} source after {timeout_secs:.1}s")]
    LoadTimeout { stream: StreamRole, timeout_secs: f64 },

    #[error("Duration mismatch: color is {color_secs:.3}s, mask is {mask_secs:.3}s")]
    DurationMismatch { color_secs: f64, mask_secs: f64 },

    #[error(
        "Dimension mismatch: color is {color_width}x{color_height}, mask is {mask_width}x{mask_height}"
    )]
    DimensionMismatch {
        color_width: u32,
        color_height: u32,
        mask_width: u32,
        mask_height: u32,
    },

    #[error("Transient decode error on {stream} source: {message}")]
    TransientDecode { stream: StreamRole, message: String },

    #[error("GPU backend initialization failed: {message}")]
    GpuInitFailed { message: String },

    #[error("Presentation surface is no longer attached")]
    SurfaceDetached,

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Media error: {message}")]
    Media { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using PlayerError.
pub type PlayerResult<T> = Result<T, PlayerError>;

/// Discriminant of [`PlayerError`], for matching without payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    LoadFailed,
    LoadTimeout,
    DurationMismatch,
    DimensionMismatch,
    TransientDecode,
    GpuInitFailed,
    SurfaceDetached,
    Render,
    Media,
    Io,
    Other,
}

impl PlayerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn load_failed(stream: StreamRole, msg: impl Into<String>) -> Self {
        Self::LoadFailed {
            stream,
            message: msg.into(),
        }
    }

    pub fn transient_decode(stream: StreamRole, msg: impl Into<String>) -> Self {
        Self::TransientDecode {
            stream,
            message: msg.into(),
        }
    }

    pub fn gpu_init(msg: impl Into<String>) -> Self {
        Self::GpuInitFailed {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media {
            message: msg.into(),
        }
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::LoadFailed { .. } => ErrorKind::LoadFailed,
            Self::LoadTimeout { .. } => ErrorKind::LoadTimeout,
            Self::DurationMismatch { .. } => ErrorKind::DurationMismatch,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::TransientDecode { .. } => ErrorKind::TransientDecode,
            Self::GpuInitFailed { .. } => ErrorKind::GpuInitFailed,
            Self::SurfaceDetached => ErrorKind::SurfaceDetached,
            Self::Render { .. } => ErrorKind::Render,
            Self::Media { .. } => ErrorKind::Media,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Other,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}

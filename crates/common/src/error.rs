//! Error types shared across Scribecast crates.

use std::fmt;

/// Why a capture device could not be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAccessKind {
    /// The user or the platform refused access.
    PermissionDenied,
    /// No matching device is present.
    NotFound,
    /// The device exists but another client holds it.
    Busy,
    /// Anything the platform reported that fits none of the above.
    Other,
}

impl fmt::Display for DeviceAccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PermissionDenied => "permission denied",
            Self::NotFound => "no device",
            Self::Busy => "device busy",
            Self::Other => "device error",
        };
        f.write_str(label)
    }
}

/// Top-level error type for Scribecast operations.
#[derive(Debug, thiserror::Error)]
pub enum ScribeError {
    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Device access failed ({kind}): {message}")]
    DeviceAccess {
        kind: DeviceAccessKind,
        message: String,
    },

    #[error("Recorder error: {message}")]
    Recorder { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Capture session is closed")]
    SessionClosed,

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ScribeError.
pub type ScribeResult<T> = Result<T, ScribeError>;

impl ScribeError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn device_access(kind: DeviceAccessKind, msg: impl Into<String>) -> Self {
        Self::DeviceAccess {
            kind,
            message: msg.into(),
        }
    }

    pub fn recorder(msg: impl Into<String>) -> Self {
        Self::Recorder {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error came from opening a capture device.
    pub fn is_device_access(&self) -> bool {
        matches!(self, Self::DeviceAccess { .. })
    }
}

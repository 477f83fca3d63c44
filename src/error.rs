//! Error types for vocap.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VocapError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Transport / protocol errors
    #[error("Connection failed: {message}")]
    Connect { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Cannot send frame while {state}")]
    NotStreaming { state: String },

    #[error("Transcription task failed: {status_text}")]
    TaskFailed { status_text: String },

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    Capture { message: String },

    // Container encoding errors
    #[error("Cannot build a container from an empty capture")]
    EmptyCapture,

    #[error("Container encoding failed: {message}")]
    Encoding { message: String },

    // Batch recognition errors
    #[error("Recognition failed: {message}")]
    Recognition { message: String },

    // Session lifecycle errors
    #[error("A capture session is already active")]
    AlreadyActive,

    #[error("Session has been destroyed")]
    Destroyed,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error category carried on session error events.
///
/// Callers route on the kind (retry prompts, UI messaging) while the
/// detail string stays free-form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connect,
    Protocol,
    Capture,
    Encoding,
    Recognition,
    Session,
}

impl VocapError {
    /// Map this error onto the reporting taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VocapError::Connect { .. } => ErrorKind::Connect,
            VocapError::Protocol { .. }
            | VocapError::NotStreaming { .. }
            | VocapError::TaskFailed { .. } => ErrorKind::Protocol,
            VocapError::DeviceNotFound { .. } | VocapError::Capture { .. } => ErrorKind::Capture,
            VocapError::EmptyCapture | VocapError::Encoding { .. } => ErrorKind::Encoding,
            VocapError::Recognition { .. } => ErrorKind::Recognition,
            VocapError::ConfigInvalidValue { .. }
            | VocapError::Config(_)
            | VocapError::AlreadyActive
            | VocapError::Destroyed
            | VocapError::Io(_) => ErrorKind::Session,
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VocapError>;

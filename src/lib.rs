//! vocap - microphone capture with streaming and batch speech recognition.
//!
//! Captures 16kHz mono PCM from the microphone, streams it to a duplex
//! transcription service while independently retaining every sample, and
//! produces a byte-exact WAV container when capture ends, for downstream
//! pronunciation scoring and archival playback.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod protocol;
pub mod recognize;
pub mod session;

// Core seams (source → session → artifacts)
pub use audio::frame::{AudioFrame, SourceEvent};
pub use audio::source::{FrameSource, MockFrameSource};
pub use audio::wav::{FrameBuffer, WavContainer};

#[cfg(feature = "cpal-audio")]
pub use audio::capture::CpalFrameSource;

// Protocol and recognition
pub use protocol::client::{ClientState, ProtocolClient, ProtocolEvent};
pub use recognize::batch::BatchRecognizer;

// Session
pub use session::controller::{Mode, SessionController, SessionEvent, SessionState};
pub use session::transcript::TranscriptState;

// Error handling
pub use error::{ErrorKind, Result, VocapError};

// Config
pub use config::{AudioConfig, Config, RecognitionConfig};

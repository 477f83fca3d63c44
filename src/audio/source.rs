//! Frame source seam: the capture device behind a mockable trait.

use crate::audio::frame::{AudioFrame, SourceEvent};
use crate::config::AudioConfig;
use crate::error::{Result, VocapError};
use tokio::sync::mpsc::UnboundedSender;

/// Trait for devices that emit discrete PCM frames.
///
/// Allows swapping implementations (real microphone vs mock). The device is
/// an exclusive hardware resource: implementations must tolerate `stop()`
/// on every exit path, including after a failed `start()`, and must emit
/// `SourceEvent::Stopped` or `SourceEvent::Error` as their final event so
/// the consumer knows no further frames follow.
pub trait FrameSource: Send {
    /// Start capturing, emitting events into `sink`.
    ///
    /// Frame emission must never block: `sink` is unbounded and sends from
    /// the device callback are wait-free.
    ///
    /// # Errors
    /// Returns `VocapError::Capture` or `VocapError::DeviceNotFound` if the
    /// device cannot be opened.
    fn start(&mut self, config: &AudioConfig, sink: UnboundedSender<SourceEvent>) -> Result<()>;

    /// Stop capturing and release the device.
    ///
    /// Idempotent; safe to call when not started.
    fn stop(&mut self) -> Result<()>;
}

/// Mock frame source for testing.
///
/// Emits a scripted list of frames synchronously on `start()`, then emits
/// `Stopped` when `stop()` is called (or `Error` mid-script when failure
/// injection is configured).
pub struct MockFrameSource {
    frames: Vec<Vec<u8>>,
    should_fail_start: bool,
    fail_after: Option<usize>,
    error_message: String,
    sink: Option<UnboundedSender<SourceEvent>>,
}

impl MockFrameSource {
    /// Create a mock source with no scripted frames.
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            should_fail_start: false,
            fail_after: None,
            error_message: "mock capture error".to_string(),
            sink: None,
        }
    }

    /// Script the frames emitted on start, in order.
    pub fn with_frames(mut self, frames: Vec<Vec<u8>>) -> Self {
        self.frames = frames;
        self
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to emit an error event after `n` frames.
    pub fn with_failure_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Configure the error message used by failure injection.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }
}

impl Default for MockFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for MockFrameSource {
    fn start(&mut self, _config: &AudioConfig, sink: UnboundedSender<SourceEvent>) -> Result<()> {
        if self.should_fail_start {
            return Err(VocapError::Capture {
                message: self.error_message.clone(),
            });
        }

        let _ = sink.send(SourceEvent::Started);
        for (sequence, bytes) in self.frames.iter().enumerate() {
            if self.fail_after == Some(sequence) {
                let _ = sink.send(SourceEvent::Error(self.error_message.clone()));
                self.sink = None;
                return Ok(());
            }
            let _ = sink.send(SourceEvent::Frame(AudioFrame::new(
                sequence as u64,
                bytes.clone(),
            )));
        }
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.take() {
            let _ = sink.send(SourceEvent::Stopped);
        }
        Ok(())
    }
}

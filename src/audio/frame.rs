//! Frame types emitted by capture sources.

use std::time::Instant;

/// One discrete chunk of raw 16-bit little-endian PCM from the capture
/// device, with metadata for ordering.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Sequence number for ordering frames.
    pub sequence: u64,
    /// Timestamp when the audio arrived from the device.
    pub timestamp: Instant,
    /// Raw sample bytes.
    pub bytes: Vec<u8>,
}

impl AudioFrame {
    /// Creates a new audio frame stamped with the current time.
    pub fn new(sequence: u64, bytes: Vec<u8>) -> Self {
        Self {
            sequence,
            timestamp: Instant::now(),
            bytes,
        }
    }

    /// Returns the duration of this frame in milliseconds for 16-bit mono
    /// PCM at the given sample rate.
    pub fn duration_ms(&self, sample_rate: u32) -> u32 {
        let samples = (self.bytes.len() / 2) as u32;
        (samples * 1000) / sample_rate
    }
}

/// Lifecycle events sent from a frame source to the session pump.
#[derive(Debug)]
pub enum SourceEvent {
    /// The device stream is live.
    Started,
    /// One captured frame.
    Frame(AudioFrame),
    /// The stream stopped cleanly; no further frames follow.
    Stopped,
    /// The device failed; no further frames follow.
    Error(String),
}

//! Frame retention and RIFF/WAVE container construction.
//!
//! The buffer keeps every captured frame in arrival order so a byte-exact
//! uncompressed container can be produced once capture ends, independently
//! of whatever happened on the streaming side.

use crate::audio::frame::AudioFrame;
use crate::error::{Result, VocapError};

/// Size of the canonical RIFF/WAVE descriptor preceding the payload.
pub const HEADER_LEN: usize = 44;

/// RIFF format tag for uncompressed linear PCM.
const FORMAT_PCM: u16 = 1;

/// A completed audio container: 44-byte header plus PCM payload.
///
/// The header-declared sizes always equal the true payload length; exactly
/// one container is built per completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavContainer {
    bytes: Vec<u8>,
}

impl WavContainer {
    /// The full container bytes (header + payload).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the container, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Length of the PCM payload, excluding the header.
    pub fn payload_len(&self) -> usize {
        self.bytes.len() - HEADER_LEN
    }

    /// The PCM payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }
}

/// Accumulates raw frames in arrival order for container export.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    payload: Vec<u8>,
    frame_count: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one frame's bytes. Order-preserving, O(1) amortized.
    pub fn append(&mut self, frame: &AudioFrame) {
        self.payload.extend_from_slice(&frame.bytes);
        self.frame_count += 1;
    }

    /// Total bytes accumulated so far.
    pub fn byte_len(&self) -> usize {
        self.payload.len()
    }

    /// Number of frames appended so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Drop all accumulated data.
    pub fn clear(&mut self) {
        self.payload.clear();
        self.frame_count = 0;
    }

    /// Build the container from everything appended so far, consuming the
    /// accumulated payload.
    ///
    /// # Errors
    /// Returns `VocapError::EmptyCapture` when no frames were appended; a
    /// header-only artifact is never produced.
    pub fn build(
        &mut self,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
    ) -> Result<WavContainer> {
        if self.frame_count == 0 {
            return Err(VocapError::EmptyCapture);
        }
        let payload = std::mem::take(&mut self.payload);
        self.frame_count = 0;
        Ok(encode_wav(&payload, sample_rate, channels, bits_per_sample))
    }
}

/// Encode a PCM payload into a standards-conformant WAVE container.
///
/// Fixed 44-byte descriptor, all multi-byte fields little-endian. The size
/// fields are computed from the true payload length for any length,
/// including zero and odd values.
fn encode_wav(payload: &[u8], sample_rate: u32, channels: u16, bits_per_sample: u16) -> WavContainer {
    let payload_len = payload.len() as u32;
    let byte_rate = sample_rate * u32::from(channels) * u32::from(bits_per_sample) / 8;
    let block_align = channels * bits_per_sample / 8;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + payload_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&bits_per_sample.to_le_bytes());

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&payload_len.to_le_bytes());
    bytes.extend_from_slice(payload);

    WavContainer { bytes }
}

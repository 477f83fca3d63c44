//! Default configuration constants for vocap.
//!
//! Shared constants used across the capture, protocol, and session layers
//! to ensure consistency and eliminate duplication.

/// Audio sample rate in Hz.
///
/// The transcription service accepts exactly 16kHz linear PCM; this is not
/// tunable, only declared in one place.
pub const SAMPLE_RATE: u32 = 16000;

/// Channel count. Mono only.
pub const CHANNELS: u16 = 1;

/// Bits per sample for linear PCM capture and the produced container.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Default frame granularity in milliseconds.
///
/// Smaller frames lower the latency between speaking and the first interim
/// result, at the cost of more (tiny) socket writes. 40ms at 16kHz mono
/// is 1280 bytes per frame.
pub const FRAME_MS: u32 = 40;

/// How long `stop()` waits for the service to confirm transcription
/// completion before giving up and building the container anyway.
pub const COMPLETION_TIMEOUT_MS: u64 = 1500;

/// How long `connect()` waits for the start acknowledgement after sending
/// the StartTranscription control message.
pub const START_ACK_TIMEOUT_MS: u64 = 5000;

/// Protocol namespace for control and event messages.
pub const PROTOCOL_NAMESPACE: &str = "SpeechTranscriber";

/// Wire name of the PCM format declared in StartTranscription.
pub const WIRE_FORMAT: &str = "pcm";

/// Number of samples in one frame at the given granularity.
pub fn frame_samples(sample_rate: u32, frame_ms: u32) -> usize {
    (sample_rate as usize * frame_ms as usize) / 1000
}

/// Number of bytes in one frame at the given granularity (16-bit mono).
pub fn frame_bytes(sample_rate: u32, frame_ms: u32) -> usize {
    frame_samples(sample_rate, frame_ms) * (BITS_PER_SAMPLE as usize / 8)
}

//! Duplex streaming transcription protocol.

pub mod client;
pub mod message;

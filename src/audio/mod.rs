//! Audio capture and container construction.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod frame;
pub mod source;
pub mod wav;

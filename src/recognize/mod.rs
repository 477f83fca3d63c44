//! Non-streaming recognition adapters.

pub mod batch;

//! Session orchestration: one recording activity end to end.

pub mod controller;
pub mod transcript;

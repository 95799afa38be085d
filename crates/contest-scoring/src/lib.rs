//! Score aggregation and medal classification for tasting competitions.
//!
//! Judges record up to five scores per sample; the engine derives the mean,
//! classifies it against the configured medal bands and tracks which rows
//! still need to reach the backing store.

pub mod config;
pub mod error;
pub mod scoring;
pub mod telemetry;

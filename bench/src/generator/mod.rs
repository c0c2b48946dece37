//! Simulated generator/receiver bench.

pub mod bench;
pub mod waveform;

pub use bench::{synthetic_bench, synthetic_stream_bench, SyntheticConfig};
pub use waveform::{Spurious, Waveform};

//! Detector library, acquisition/detection pipeline and calibration analysis
//! for spectrum-sensing evaluation campaigns.
//!
//! Blocks of baseband samples are captured for a sweep of stimulus levels,
//! reduced to per-window detection statistics, persisted, and finally turned
//! into a decision threshold and a detection-probability curve.

pub mod analysis;
pub mod campaign;
pub mod detectors;
pub mod interface;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use prelude::{
    PipelineStage, SampleBlock, SamplingConfig, SenseError, SenseResult, StatisticVector,
    StimulusLevel,
};

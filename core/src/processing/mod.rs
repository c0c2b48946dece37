pub mod acquisition;
pub mod detection;
pub mod pipeline;

pub use acquisition::{AcquisitionRequest, AcquisitionStage, WarmupState};
pub use detection::DetectionStage;
pub use pipeline::{CaptureOutcome, DetectionOutcome, Pipeline, StageMessage};

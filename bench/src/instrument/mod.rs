//! Drivers for the bench hardware: SCPI signal generator and external recorder.

pub mod capture_tool;
pub mod scpi;

pub use capture_tool::{CaptureTool, CaptureToolConfig};
pub use scpi::{ScpiConfig, ScpiGenerator};

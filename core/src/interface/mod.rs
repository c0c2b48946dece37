//! Capabilities the core consumes from instrument collaborators.

pub mod source;
pub mod stream;

pub use source::{SampleSource, StimulusSource};
pub use stream::{CancellationToken, ChunkDevice, ChunkStream, StreamingSource};

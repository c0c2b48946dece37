//! Adapter from chunk-producing sampling loops to the blocking [`SampleSource`] contract.

use crate::interface::source::SampleSource;
use crate::prelude::{SamplingConfig, SenseError, SenseResult};
use crate::telemetry::log::LogManager;
use num_complex::Complex32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub type ChunkStream<'a> = Box<dyn Iterator<Item = SenseResult<Vec<Complex32>>> + 'a>;

/// Device that delivers samples in chunks for as long as it is polled.
pub trait ChunkDevice: Send {
    fn slug(&self) -> &str;

    fn warm_up(&mut self) -> SenseResult<()> {
        Ok(())
    }

    /// Starts a sampling run; the run stops when the stream is dropped.
    fn stream(&mut self, config: &SamplingConfig) -> SenseResult<ChunkStream<'_>>;
}

/// Pulls chunks from a [`ChunkDevice`] until the capture target is met.
pub struct StreamingSource<D> {
    device: D,
    cancel: CancellationToken,
    logger: LogManager,
}

impl<D: ChunkDevice> StreamingSource<D> {
    pub fn new(device: D, cancel: CancellationToken) -> Self {
        Self {
            device,
            cancel,
            logger: LogManager::new("stream"),
        }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl<D: ChunkDevice> SampleSource for StreamingSource<D> {
    fn slug(&self) -> &str {
        self.device.slug()
    }

    fn warm_up(&mut self) -> SenseResult<()> {
        self.logger.record("begin warm-up");
        self.device.warm_up()?;
        self.logger.record("end warm-up");
        Ok(())
    }

    fn capture(&mut self, config: &SamplingConfig) -> SenseResult<Vec<Complex32>> {
        let target = config.total_samples();
        let mut samples = Vec::with_capacity(target);
        let mut stream = self.device.stream(config)?;

        while samples.len() < target {
            if self.cancel.is_cancelled() {
                return Err(SenseError::Capture(format!(
                    "capture cancelled after {} of {} samples",
                    samples.len(),
                    target
                )));
            }
            match stream.next() {
                Some(chunk) => samples.extend(chunk?),
                None => break,
            }
        }
        drop(stream);

        if samples.len() < target {
            return Err(SenseError::Capture(format!(
                "stream ended after {} of {} samples",
                samples.len(),
                target
            )));
        }
        if samples.len() > target {
            self.logger
                .detail(&format!("truncating {} samples", samples.len() - target));
            samples.truncate(target);
        }
        Ok(samples)
    }
}

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Counters shared by the two workers of one pipeline.
pub struct MetricsRecorder {
    inner: Mutex<PipelineMetrics>,
}

/// Snapshot of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub captures: usize,
    pub samples_captured: usize,
    pub windows_processed: usize,
    pub failures: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PipelineMetrics::default()),
        }
    }

    pub fn record_capture(&self, samples: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.captures += 1;
            metrics.samples_captured += samples;
        }
    }

    pub fn record_windows(&self, windows: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.windows_processed += windows;
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.failures += 1;
        }
    }

    pub fn snapshot(&self) -> PipelineMetrics {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            PipelineMetrics::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

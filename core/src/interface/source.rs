use crate::prelude::{SamplingConfig, SenseResult, StimulusLevel};
use num_complex::Complex32;

/// Synchronous capture device: blocks until the requested samples are available.
pub trait SampleSource: Send {
    /// Short name used in output paths.
    fn slug(&self) -> &str;

    /// Brings the device to a steady state before the first capture.
    fn warm_up(&mut self) -> SenseResult<()> {
        Ok(())
    }

    /// Captures `config.total_samples()` samples at the configured carrier and rate.
    fn capture(&mut self, config: &SamplingConfig) -> SenseResult<Vec<Complex32>>;
}

/// Signal generator driving the stimulus into the receiver.
pub trait StimulusSource: Send {
    /// Short name used in output paths.
    fn slug(&self) -> &str;

    /// Tunes to `frequency_hz` and applies `level`; `Off` disables the output.
    fn set(&mut self, frequency_hz: f64, level: &StimulusLevel) -> SenseResult<()>;

    fn off(&mut self) -> SenseResult<()>;
}

impl<T: SampleSource + ?Sized> SampleSource for Box<T> {
    fn slug(&self) -> &str {
        (**self).slug()
    }

    fn warm_up(&mut self) -> SenseResult<()> {
        (**self).warm_up()
    }

    fn capture(&mut self, config: &SamplingConfig) -> SenseResult<Vec<Complex32>> {
        (**self).capture(config)
    }
}

impl<T: StimulusSource + ?Sized> StimulusSource for Box<T> {
    fn slug(&self) -> &str {
        (**self).slug()
    }

    fn set(&mut self, frequency_hz: f64, level: &StimulusLevel) -> SenseResult<()> {
        (**self).set(frequency_hz, level)
    }

    fn off(&mut self) -> SenseResult<()> {
        (**self).off()
    }
}

use crate::interface::source::{SampleSource, StimulusSource};
use crate::prelude::{
    PipelineStage, SampleBlock, SamplingConfig, SenseError, SenseResult, StimulusLevel,
};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::MetricsRecorder;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One capture to perform: a stimulus level under a sampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionRequest {
    pub level: StimulusLevel,
    pub sampling: SamplingConfig,
}

/// Records whether the capture device has been warmed up.
///
/// Owned by the acquisition stage and consulted by the next request only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupState {
    warm: bool,
}

impl WarmupState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a device that needs no warm-up run.
    pub fn already_warm() -> Self {
        Self { warm: true }
    }

    pub fn is_warm(&self) -> bool {
        self.warm
    }

    fn mark_warm(&mut self) {
        self.warm = true;
    }
}

/// Drives the stimulus generator and the capture device for each request.
pub struct AcquisitionStage<S, G> {
    source: S,
    stimulus: G,
    warmup: WarmupState,
    config: Option<SamplingConfig>,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl<S: SampleSource, G: StimulusSource> AcquisitionStage<S, G> {
    pub fn new(source: S, stimulus: G, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            source,
            stimulus,
            warmup: WarmupState::new(),
            config: None,
            metrics,
            logger: LogManager::new("acquisition"),
        }
    }

    pub fn with_warmup(mut self, warmup: WarmupState) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn warmup_state(&self) -> WarmupState {
        self.warmup
    }

    pub fn source_slug(&self) -> &str {
        self.source.slug()
    }

    pub fn stimulus_slug(&self) -> &str {
        self.stimulus.slug()
    }

    /// Stimulus on, capture, stimulus off; the generator is switched off even
    /// when the capture fails.
    fn capture_level(&mut self, request: &AcquisitionRequest) -> SenseResult<Vec<Complex32>> {
        let frequency = request.sampling.carrier_hz
            + request.sampling.stimulus_offset_hz
            + request.level.offset_hz();
        self.stimulus.set(frequency, &request.level)?;
        let captured = self.source.capture(&request.sampling);
        let switched_off = self.stimulus.off();
        let samples = captured?;
        switched_off?;
        Ok(samples)
    }
}

impl<S: SampleSource, G: StimulusSource> PipelineStage for AcquisitionStage<S, G> {
    type Input = AcquisitionRequest;
    type Output = SampleBlock;

    fn initialize(&mut self, config: &SamplingConfig) -> SenseResult<()> {
        config.validate()?;
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, request: AcquisitionRequest) -> SenseResult<SampleBlock> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| SenseError::Internal("acquisition stage not initialized".into()))?;
        if &request.sampling != config {
            return Err(SenseError::Precondition(
                "request sampling does not match the acquisition configuration".into(),
            ));
        }

        if !self.warmup.is_warm() {
            self.source
                .warm_up()
                .map_err(|err| SenseError::Capture(format!("warm-up failed: {}", err)))?;
            self.warmup.mark_warm();
        }

        let expected = request.sampling.total_samples();
        self.logger.record(&format!(
            "recording {} samples at {:.0} Hz, stimulus {}",
            expected, request.sampling.carrier_hz, request.level
        ));

        let samples = self.capture_level(&request).map_err(|err| match err {
            SenseError::Capture(_) => err,
            other => SenseError::Capture(other.to_string()),
        })?;
        if samples.len() < expected {
            return Err(SenseError::Capture(format!(
                "short capture: {} of {} samples",
                samples.len(),
                expected
            )));
        }

        self.metrics.record_capture(samples.len());
        Ok(SampleBlock::new(samples, request.level, request.sampling))
    }

    fn cleanup(&mut self) {
        if let Err(err) = self.stimulus.off() {
            self.logger
                .warn(&format!("failed to switch stimulus off: {}", err));
        }
        self.config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct ScriptedSource {
        journal: Journal,
        fail: bool,
        short: bool,
    }

    impl SampleSource for ScriptedSource {
        fn slug(&self) -> &str {
            "scripted"
        }

        fn warm_up(&mut self) -> SenseResult<()> {
            self.journal.lock().unwrap().push("warmup".into());
            Ok(())
        }

        fn capture(&mut self, config: &SamplingConfig) -> SenseResult<Vec<Complex32>> {
            self.journal.lock().unwrap().push("capture".into());
            if self.fail {
                return Err(SenseError::Capture("device unplugged".into()));
            }
            let len = if self.short {
                config.total_samples() - 1
            } else {
                config.total_samples()
            };
            Ok(vec![Complex32::new(1.0, 0.0); len])
        }
    }

    struct RecordingGenerator {
        journal: Journal,
    }

    impl StimulusSource for RecordingGenerator {
        fn slug(&self) -> &str {
            "recording"
        }

        fn set(&mut self, frequency_hz: f64, level: &StimulusLevel) -> SenseResult<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("set {:.0} {}", frequency_hz, level.token()));
            Ok(())
        }

        fn off(&mut self) -> SenseResult<()> {
            self.journal.lock().unwrap().push("off".into());
            Ok(())
        }
    }

    fn sampling() -> SamplingConfig {
        SamplingConfig {
            carrier_hz: 864e6,
            sample_rate_hz: 1e6,
            window_len: 4,
            window_count: 3,
            extra: 2,
            stimulus_offset_hz: 250e3,
        }
    }

    fn stage(journal: &Journal, fail: bool, short: bool) -> AcquisitionStage<ScriptedSource, RecordingGenerator> {
        AcquisitionStage::new(
            ScriptedSource {
                journal: journal.clone(),
                fail,
                short,
            },
            RecordingGenerator {
                journal: journal.clone(),
            },
            Arc::new(MetricsRecorder::new()),
        )
    }

    #[test]
    fn capture_is_bracketed_by_stimulus_commands() {
        let journal = Journal::default();
        let mut stage = stage(&journal, false, false);
        stage.initialize(&sampling()).unwrap();

        let request = AcquisitionRequest {
            level: StimulusLevel::Power { dbm: -70.0 },
            sampling: sampling(),
        };
        let block = stage.execute(request.clone()).unwrap();
        assert_eq!(block.samples().len(), 14);
        assert_eq!(block.window_count(), 3);
        stage.execute(request).unwrap();

        let entries = journal.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec![
                "warmup",
                "set 864250000 m70_0dbm",
                "capture",
                "off",
                "set 864250000 m70_0dbm",
                "capture",
                "off"
            ]
        );
        assert!(stage.warmup_state().is_warm());
    }

    #[test]
    fn injected_warm_state_skips_warmup() {
        let journal = Journal::default();
        let mut stage = stage(&journal, false, false).with_warmup(WarmupState::already_warm());
        stage.initialize(&sampling()).unwrap();
        stage
            .execute(AcquisitionRequest {
                level: StimulusLevel::Off,
                sampling: sampling(),
            })
            .unwrap();
        assert_eq!(journal.lock().unwrap()[0], "set 864250000 off");
    }

    #[test]
    fn failed_capture_still_switches_stimulus_off() {
        let journal = Journal::default();
        let mut stage = stage(&journal, true, false);
        stage.initialize(&sampling()).unwrap();
        let err = stage
            .execute(AcquisitionRequest {
                level: StimulusLevel::Power { dbm: -80.0 },
                sampling: sampling(),
            })
            .unwrap_err();
        assert!(matches!(err, SenseError::Capture(_)));
        assert_eq!(journal.lock().unwrap().last().unwrap(), "off");
    }

    #[test]
    fn short_capture_is_rejected() {
        let journal = Journal::default();
        let mut stage = stage(&journal, false, true);
        stage.initialize(&sampling()).unwrap();
        let err = stage
            .execute(AcquisitionRequest {
                level: StimulusLevel::Off,
                sampling: sampling(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("short capture"));
    }

    #[test]
    fn mismatched_sampling_is_a_precondition_violation() {
        let journal = Journal::default();
        let mut stage = stage(&journal, false, false);
        stage.initialize(&sampling()).unwrap();
        let mut other = sampling();
        other.sample_rate_hz = 2e6;
        let err = stage
            .execute(AcquisitionRequest {
                level: StimulusLevel::Off,
                sampling: other,
            })
            .unwrap_err();
        assert!(matches!(err, SenseError::Precondition(_)));
    }
}

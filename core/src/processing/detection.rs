use crate::detectors::{Detector, DetectorSpec, WindowDetector};
use crate::prelude::{
    PipelineStage, SampleBlock, SamplingConfig, SenseError, SenseResult, StatisticVector,
};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::MetricsRecorder;
use std::sync::Arc;

/// Windows raw blocks and evaluates every configured detector on each window.
pub struct DetectionStage {
    specs: Vec<DetectorSpec>,
    detectors: Vec<Option<Detector>>,
    config: Option<SamplingConfig>,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl DetectionStage {
    pub fn new(specs: Vec<DetectorSpec>, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            specs,
            detectors: Vec::new(),
            config: None,
            metrics,
            logger: LogManager::new("detection"),
        }
    }

    pub fn detector_names(&self) -> Vec<String> {
        self.specs.iter().map(DetectorSpec::name).collect()
    }

    /// Whether compensated detectors are still waiting for an `Off` block.
    pub fn awaiting_reference(&self) -> bool {
        self.detectors.iter().any(Option::is_none)
    }

    /// Reference window for compensated detectors.
    ///
    /// Taken from the tail of the settling prefix when it holds a full window, so the
    /// reference stays independent of the off statistics. Otherwise the first payload
    /// window doubles as the reference and its own statistic is degenerate.
    fn reference_window(&self, block: &SampleBlock) -> SenseResult<Vec<f64>> {
        let window_len = block.sampling().window_len;
        let extra = block.sampling().extra;
        if extra >= window_len && block.samples().len() >= extra {
            return Ok(block.samples()[extra - window_len..extra]
                .iter()
                .map(|s| s.re as f64)
                .collect());
        }
        self.logger.warn(&format!(
            "settling prefix of {} samples is shorter than a window; the first off window is reused as the noise reference",
            extra
        ));
        block.real_windows().next().ok_or_else(|| {
            SenseError::Precondition("off block holds no complete window for a noise reference".into())
        })
    }

    fn capture_reference(&mut self, block: &SampleBlock) -> SenseResult<()> {
        let reference = self.reference_window(block)?;
        for (spec, slot) in self.specs.iter().zip(self.detectors.iter_mut()) {
            if slot.is_none() {
                *slot = Some(spec.build_with_reference(&reference)?);
            }
        }
        self.logger.record(&format!(
            "captured {}-sample noise reference for compensated detectors",
            reference.len()
        ));
        Ok(())
    }

    /// One statistic vector per detector, window order preserved.
    pub fn compute(&mut self, block: &SampleBlock) -> SenseResult<Vec<StatisticVector>> {
        let matches_config = self
            .config
            .as_ref()
            .map(|config| config == block.sampling())
            .ok_or_else(|| SenseError::Internal("detection stage not initialized".into()))?;
        if !matches_config {
            return Err(SenseError::Precondition(
                "block sampling does not match the detection configuration".into(),
            ));
        }

        if self.awaiting_reference() {
            if !block.level().is_off() {
                return Err(SenseError::Precondition(format!(
                    "compensated detectors need the off level before {}",
                    block.level()
                )));
            }
            self.capture_reference(block)?;
        }

        let windows: Vec<Vec<f64>> = block.real_windows().collect();
        let mut vectors = Vec::with_capacity(self.detectors.len());
        for detector in self.detectors.iter().flatten() {
            let mut vector =
                StatisticVector::new(detector.name(), block.level(), block.sampling().clone());
            for window in &windows {
                vector.push(detector.compute(window)?);
            }
            vectors.push(vector);
        }

        self.metrics.record_windows(windows.len());
        self.logger.detail(&format!(
            "{} windows x {} detectors at {}",
            windows.len(),
            vectors.len(),
            block.level()
        ));
        Ok(vectors)
    }
}

impl PipelineStage for DetectionStage {
    type Input = SampleBlock;
    type Output = Vec<StatisticVector>;

    fn initialize(&mut self, config: &SamplingConfig) -> SenseResult<()> {
        config.validate()?;
        if self.specs.is_empty() {
            return Err(SenseError::Precondition("no detectors configured".into()));
        }

        let mut detectors = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            spec.check_window_len(config.window_len)?;
            if spec.needs_reference() {
                detectors.push(None);
            } else {
                detectors.push(Some(spec.build()?));
            }
        }

        self.detectors = detectors;
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, block: SampleBlock) -> SenseResult<Vec<StatisticVector>> {
        self.compute(&block)
    }

    fn cleanup(&mut self) {
        self.detectors.clear();
        self.config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::{CovarianceStatistic, CycloStatistic, EigenStatistic};
    use crate::prelude::StimulusLevel;
    use num_complex::Complex32;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    fn sampling() -> SamplingConfig {
        SamplingConfig {
            carrier_hz: 864e6,
            sample_rate_hz: 1e6,
            window_len: 64,
            window_count: 5,
            extra: 10,
            stimulus_offset_hz: 0.0,
        }
    }

    fn noise_block(level: StimulusLevel, seed: u64, extra_tail: usize) -> SampleBlock {
        noise_block_with(sampling(), level, seed, extra_tail)
    }

    fn noise_block_with(
        config: SamplingConfig,
        level: StimulusLevel,
        seed: u64,
        extra_tail: usize,
    ) -> SampleBlock {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let samples = (0..config.total_samples() + extra_tail)
            .map(|_| Complex32::new(normal.sample(&mut rng), normal.sample(&mut rng)))
            .collect();
        SampleBlock::new(samples, level, config)
    }

    #[test]
    fn detection_stage_emits_one_vector_per_detector() {
        let mut stage = DetectionStage::new(
            vec![
                DetectorSpec::Energy,
                DetectorSpec::Covariance {
                    statistic: CovarianceStatistic::Cav,
                    lags: 4,
                    compensated: false,
                },
            ],
            Arc::new(MetricsRecorder::new()),
        );
        stage.initialize(&sampling()).unwrap();

        // a trailing partial window is dropped
        let block = noise_block(StimulusLevel::Power { dbm: -70.0 }, 1, 30);
        let vectors = stage.execute(block.clone()).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].detector(), "ed");
        assert_eq!(vectors[1].detector(), "cav_l4");
        assert!(vectors.iter().all(|v| v.len() == 5));

        let expected: Vec<f64> = block
            .real_windows()
            .map(|w| w.iter().map(|v| v * v).sum())
            .collect();
        assert_eq!(vectors[0].values(), expected.as_slice());
        stage.cleanup();
    }

    #[test]
    fn compensated_detectors_require_off_block_first() {
        let spec = DetectorSpec::Eigenvalue {
            statistic: EigenStatistic::Mme,
            lags: 4,
            compensated: true,
        };
        let mut stage = DetectionStage::new(vec![spec], Arc::new(MetricsRecorder::new()));
        stage.initialize(&sampling()).unwrap();
        assert!(stage.awaiting_reference());

        let early = stage.execute(noise_block(StimulusLevel::Power { dbm: -60.0 }, 2, 0));
        assert!(matches!(early, Err(SenseError::Precondition(_))));

        let off = stage.execute(noise_block(StimulusLevel::Off, 3, 0)).unwrap();
        assert!(!stage.awaiting_reference());
        assert_eq!(off[0].detector(), "mme_l4_nc");
        // a 10-sample settling prefix cannot hold a window, so the first off window is the reference
        assert!((off[0].values()[0] - 1.0).abs() < 1e-9);

        let later = stage
            .execute(noise_block(StimulusLevel::Power { dbm: -60.0 }, 4, 0))
            .unwrap();
        assert_eq!(later[0].len(), 5);
    }

    #[test]
    fn reference_comes_from_settling_prefix_when_it_holds_a_window() {
        let config = SamplingConfig {
            extra: 64,
            ..sampling()
        };
        let specs = vec![
            DetectorSpec::Eigenvalue {
                statistic: EigenStatistic::Mme,
                lags: 4,
                compensated: true,
            },
            DetectorSpec::Covariance {
                statistic: CovarianceStatistic::Mac,
                lags: 4,
                compensated: true,
            },
        ];
        let mut stage = DetectionStage::new(specs, Arc::new(MetricsRecorder::new()));
        stage.initialize(&config).unwrap();

        let block = noise_block_with(config, StimulusLevel::Off, 6, 0);
        let off = stage.execute(block).unwrap();
        assert!(!stage.awaiting_reference());
        assert_eq!(off[0].len(), 5);
        assert!(off[0].values().iter().all(|&v| (v - 1.0).abs() > 1e-9));
        assert!(off[1].values().iter().all(|&v| v.abs() > 1e-12));
    }

    #[test]
    fn oversized_detector_parameters_fail_at_initialize() {
        let oversized = [
            DetectorSpec::Cyclostationary {
                statistic: CycloStatistic::Scf,
                fft_size: 128,
                smoothing: 32,
            },
            DetectorSpec::Covariance {
                statistic: CovarianceStatistic::Cav,
                lags: 100,
                compensated: true,
            },
        ];
        for spec in oversized {
            let mut stage = DetectionStage::new(
                vec![DetectorSpec::Energy, spec],
                Arc::new(MetricsRecorder::new()),
            );
            assert!(matches!(
                stage.initialize(&sampling()),
                Err(SenseError::Precondition(_))
            ));
        }
    }

    #[test]
    fn power_sum_block_must_match_window() {
        let mut stage = DetectionStage::new(
            vec![DetectorSpec::PowerSum { block: 32 }],
            Arc::new(MetricsRecorder::new()),
        );
        assert!(matches!(
            stage.initialize(&sampling()),
            Err(SenseError::Precondition(_))
        ));
    }

    #[test]
    fn uninitialized_stage_reports_internal_error() {
        let mut stage = DetectionStage::new(vec![DetectorSpec::Energy], Arc::new(MetricsRecorder::new()));
        let result = stage.execute(noise_block(StimulusLevel::Off, 5, 0));
        assert!(matches!(result, Err(SenseError::Internal(_))));
    }
}

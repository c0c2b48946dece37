use crate::campaign::storage::{self, OutputLayout};
use crate::detectors::DetectorSpec;
use crate::interface::source::{SampleSource, StimulusSource};
use crate::prelude::{SamplingConfig, SenseError, SenseResult, StatisticVector, StimulusLevel};
use crate::processing::acquisition::{AcquisitionRequest, AcquisitionStage};
use crate::processing::detection::DetectionStage;
use crate::processing::pipeline::{DetectionOutcome, Pipeline};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, PipelineMetrics};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// What to do when capturing one level fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop submitting, drain, and fail the campaign.
    #[default]
    Abort,
    /// Record the level as missing and carry on with the sweep.
    Continue,
}

/// Serializable description of one campaign, rebuilt by whichever task runs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSpec {
    pub name: String,
    pub sampling: SamplingConfig,
    pub levels: Vec<StimulusLevel>,
    pub detectors: Vec<DetectorSpec>,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub keep_raw: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl CampaignSpec {
    pub fn validate(&self) -> SenseResult<()> {
        self.sampling.validate()?;
        if self.levels.is_empty() {
            return Err(SenseError::Precondition(format!(
                "campaign {} has no stimulus levels",
                self.name
            )));
        }
        let mut tokens = HashSet::new();
        for level in &self.levels {
            if !tokens.insert(level.token()) {
                return Err(SenseError::Precondition(format!(
                    "campaign {} repeats level {}",
                    self.name, level
                )));
            }
        }

        if self.detectors.is_empty() {
            return Err(SenseError::Precondition(format!(
                "campaign {} has no detectors",
                self.name
            )));
        }
        let mut names = HashSet::new();
        for spec in &self.detectors {
            spec.check_window_len(self.sampling.window_len)
                .map_err(|err| match err {
                    SenseError::Precondition(reason) => {
                        SenseError::Precondition(format!("campaign {}: {}", self.name, reason))
                    }
                    other => other,
                })?;
            if !names.insert(spec.name()) {
                return Err(SenseError::Precondition(format!(
                    "campaign {} repeats detector {}",
                    self.name,
                    spec.name()
                )));
            }
        }

        let compensated = self.detectors.iter().any(DetectorSpec::needs_reference);
        if compensated && !self.levels.iter().any(StimulusLevel::is_off) {
            return Err(SenseError::Precondition(format!(
                "campaign {} has compensated detectors but no off level",
                self.name
            )));
        }
        Ok(())
    }

    /// Sweep order: as configured, except that `Off` leads when any detector
    /// needs a noise reference.
    pub fn sweep_order(&self) -> Vec<StimulusLevel> {
        let mut levels = self.levels.clone();
        if self.detectors.iter().any(DetectorSpec::needs_reference) {
            if let Some(position) = levels.iter().position(StimulusLevel::is_off) {
                let off = levels.remove(position);
                levels.insert(0, off);
            }
        }
        levels
    }

    pub fn detector_names(&self) -> Vec<String> {
        self.detectors.iter().map(DetectorSpec::name).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignState {
    Idle,
    Running,
    Draining,
    Done,
}

/// Everything a finished campaign produced.
#[derive(Debug, Clone)]
pub struct CampaignOutcome {
    pub name: String,
    pub prefix: String,
    pub vectors: Vec<StatisticVector>,
    pub files: Vec<PathBuf>,
    pub missing: Vec<StimulusLevel>,
    pub metrics: PipelineMetrics,
}

impl CampaignOutcome {
    pub fn vector(&self, detector: &str, level: &StimulusLevel) -> Option<&StatisticVector> {
        self.vectors
            .iter()
            .find(|vector| vector.detector() == detector && &vector.level() == level)
    }
}

/// JSON record written next to the statistic files.
#[derive(Debug, Serialize)]
struct CampaignSummary<'a> {
    name: &'a str,
    prefix: &'a str,
    sampling: &'a SamplingConfig,
    detectors: Vec<String>,
    levels: Vec<String>,
    missing: Vec<String>,
    metrics: PipelineMetrics,
    files: &'a [PathBuf],
}

/// Persists results as they arrive and tracks failures against the policy.
struct ResultCollector<'a> {
    layout: &'a OutputLayout,
    policy: FailurePolicy,
    metrics: &'a MetricsRecorder,
    logger: &'a LogManager,
    vectors: Vec<StatisticVector>,
    files: Vec<PathBuf>,
    missing: Vec<StimulusLevel>,
    abort_cause: Option<SenseError>,
}

impl ResultCollector<'_> {
    fn accept(&mut self, outcome: DetectionOutcome) -> SenseResult<()> {
        match outcome {
            DetectionOutcome::Computed {
                level,
                vectors,
                block,
            } => {
                for vector in vectors {
                    let path = self.layout.statistic_path(vector.detector(), &level);
                    storage::write_statistics(&path, &vector)?;
                    self.files.push(path);
                    self.vectors.push(vector);
                }
                if let Some(block) = block {
                    let path = self.layout.raw_path(&level);
                    storage::write_block(&path, block.samples())?;
                    self.files.push(path);
                }
                self.logger.record(&format!("stored results for {}", level));
            }
            DetectionOutcome::Failed { level, error } => {
                self.metrics.record_failure();
                self.missing.push(level);
                // a broken detector setup fails every later level too
                if let SenseError::Precondition(_) = error {
                    self.logger
                        .warn(&format!("level {} cannot be evaluated: {}", level, error));
                    return Err(error);
                }
                match self.policy {
                    FailurePolicy::Abort => {
                        self.logger
                            .warn(&format!("level {} failed, aborting: {}", level, error));
                        self.abort_cause.get_or_insert(error);
                    }
                    FailurePolicy::Continue => {
                        self.logger
                            .warn(&format!("level {} failed, continuing: {}", level, error));
                    }
                }
            }
        }
        Ok(())
    }

    fn should_stop(&self) -> bool {
        self.abort_cause.is_some()
    }
}

/// Drives one campaign through the acquisition/detection pipeline.
pub struct Campaign {
    spec: CampaignSpec,
    state: CampaignState,
    logger: LogManager,
}

impl Campaign {
    pub fn new(spec: CampaignSpec) -> Self {
        Self {
            spec,
            state: CampaignState::Idle,
            logger: LogManager::new("campaign"),
        }
    }

    pub fn spec(&self) -> &CampaignSpec {
        &self.spec
    }

    pub fn state(&self) -> CampaignState {
        self.state
    }

    fn transition(&mut self, next: CampaignState) {
        self.logger.detail(&format!(
            "{}: {:?} -> {:?}",
            self.spec.name, self.state, next
        ));
        self.state = next;
    }

    /// Runs the full sweep and persists every statistic vector.
    pub fn run<S, G>(&mut self, source: S, stimulus: G) -> SenseResult<CampaignOutcome>
    where
        S: SampleSource + 'static,
        G: StimulusSource + 'static,
    {
        if self.state != CampaignState::Idle {
            return Err(SenseError::Internal(format!(
                "campaign {} already ran",
                self.spec.name
            )));
        }
        self.spec.validate()?;

        let levels = self.spec.sweep_order();
        let detectors = self.spec.detector_names();
        let layout = OutputLayout::new(
            &self.spec.output_dir,
            source.slug(),
            stimulus.slug(),
            &self.spec.sampling,
        );
        layout.prepare(&layout.planned_paths(&detectors, &levels, self.spec.keep_raw))?;

        let metrics = Arc::new(MetricsRecorder::new());
        let acquisition = AcquisitionStage::new(source, stimulus, Arc::clone(&metrics));
        let detection = DetectionStage::new(self.spec.detectors.clone(), Arc::clone(&metrics));
        let mut pipeline = Pipeline::spawn(
            acquisition,
            detection,
            &self.spec.sampling,
            self.spec.keep_raw,
        )?;

        self.logger.record(&format!(
            "{}: {} levels x {} detectors into {}",
            self.spec.name,
            levels.len(),
            detectors.len(),
            layout.dir().display()
        ));
        self.transition(CampaignState::Running);

        let logger = self.logger.clone();
        let mut collector = ResultCollector {
            layout: &layout,
            policy: self.spec.failure_policy,
            metrics: &metrics,
            logger: &logger,
            vectors: Vec::new(),
            files: Vec::new(),
            missing: Vec::new(),
            abort_cause: None,
        };
        let mut fatal: Option<SenseError> = None;

        for level in &levels {
            while let Some(outcome) = pipeline.try_next() {
                if let Err(err) = collector.accept(outcome) {
                    fatal.get_or_insert(err);
                }
            }
            if fatal.is_some() || collector.should_stop() {
                break;
            }
            let request = AcquisitionRequest {
                level: *level,
                sampling: self.spec.sampling.clone(),
            };
            if let Err(err) = pipeline.submit(request) {
                fatal = Some(err);
                break;
            }
        }

        self.transition(CampaignState::Draining);
        match pipeline.shutdown() {
            Ok(remaining) => {
                for outcome in remaining {
                    if let Err(err) = collector.accept(outcome) {
                        fatal.get_or_insert(err);
                    }
                }
            }
            Err(err) => {
                fatal.get_or_insert(err);
            }
        }
        self.transition(CampaignState::Done);

        let ResultCollector {
            vectors,
            mut files,
            missing,
            abort_cause,
            ..
        } = collector;
        if let Some(err) = fatal.or(abort_cause) {
            return Err(err);
        }

        let snapshot = metrics.snapshot();
        let summary_path = layout.summary_path();
        let summary = CampaignSummary {
            name: &self.spec.name,
            prefix: layout.prefix(),
            sampling: &self.spec.sampling,
            detectors,
            levels: levels.iter().map(StimulusLevel::token).collect(),
            missing: missing.iter().map(StimulusLevel::token).collect(),
            metrics: snapshot,
            files: &files,
        };
        let mut file = storage::create_new(&summary_path)?;
        serde_json::to_writer_pretty(&mut file, &summary)?;
        file.write_all(b"\n")?;
        files.push(summary_path);

        self.logger.record(&format!(
            "{}: {} captures, {} windows, {} failures",
            self.spec.name, snapshot.captures, snapshot.windows_processed, snapshot.failures
        ));

        Ok(CampaignOutcome {
            name: self.spec.name.clone(),
            prefix: layout.prefix().to_string(),
            vectors,
            files,
            missing,
            metrics: snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{analyze_vectors, AnalysisParams};
    use crate::detectors::{CovarianceStatistic, CycloStatistic, EigenStatistic};
    use num_complex::Complex32;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::{Distribution, Normal};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Noise source whose amplitude follows the level set on the paired generator.
    struct MockBench {
        level: Arc<Mutex<StimulusLevel>>,
        rng: StdRng,
        fail_on: Option<StimulusLevel>,
    }

    struct MockGenerator {
        level: Arc<Mutex<StimulusLevel>>,
    }

    impl SampleSource for MockBench {
        fn slug(&self) -> &str {
            "mock"
        }

        fn capture(&mut self, config: &SamplingConfig) -> SenseResult<Vec<Complex32>> {
            let level = *self.level.lock().unwrap();
            if Some(level) == self.fail_on {
                return Err(SenseError::Capture(format!("no samples at {}", level)));
            }
            let tone = match level.dbm() {
                Some(dbm) => 10f32.powf((dbm as f32 + 70.0) / 20.0),
                None => 0.0,
            };
            let normal = Normal::new(0.0f32, 1.0).unwrap();
            Ok((0..config.total_samples())
                .map(|n| {
                    let carrier = tone * (std::f32::consts::FRAC_PI_2 * n as f32).cos();
                    Complex32::new(carrier + normal.sample(&mut self.rng), 0.0)
                })
                .collect())
        }
    }

    impl StimulusSource for MockGenerator {
        fn slug(&self) -> &str {
            "mockgen"
        }

        fn set(&mut self, _frequency_hz: f64, level: &StimulusLevel) -> SenseResult<()> {
            *self.level.lock().unwrap() = *level;
            Ok(())
        }

        fn off(&mut self) -> SenseResult<()> {
            *self.level.lock().unwrap() = StimulusLevel::Off;
            Ok(())
        }
    }

    fn bench(seed: u64, fail_on: Option<StimulusLevel>) -> (MockBench, MockGenerator) {
        let level = Arc::new(Mutex::new(StimulusLevel::Off));
        (
            MockBench {
                level: level.clone(),
                rng: StdRng::seed_from_u64(seed),
                fail_on,
            },
            MockGenerator { level },
        )
    }

    fn spec(output_dir: PathBuf, levels: Vec<StimulusLevel>) -> CampaignSpec {
        CampaignSpec {
            name: "unit".into(),
            sampling: SamplingConfig {
                carrier_hz: 864e6,
                sample_rate_hz: 1e6,
                window_len: 256,
                window_count: 20,
                extra: 64,
                stimulus_offset_hz: 250e3,
            },
            levels,
            detectors: vec![DetectorSpec::Energy],
            output_dir,
            keep_raw: false,
            failure_policy: FailurePolicy::Abort,
        }
    }

    #[test]
    fn two_level_campaign_produces_vectors_and_a_one_point_curve() {
        let dir = tempdir().unwrap();
        let signal = StimulusLevel::Power { dbm: -60.0 };
        let mut campaign = Campaign::new(spec(
            dir.path().to_path_buf(),
            vec![StimulusLevel::Off, signal],
        ));
        let (source, generator) = bench(1, None);
        let outcome = campaign.run(source, generator).unwrap();

        assert_eq!(campaign.state(), CampaignState::Done);
        assert_eq!(outcome.vectors.len(), 2);
        assert!(outcome.vectors.iter().all(|vector| vector.len() == 20));
        assert!(outcome.missing.is_empty());
        assert_eq!(outcome.metrics.captures, 2);
        assert_eq!(outcome.metrics.windows_processed, 40);

        let off_path = dir
            .path()
            .join("mock_mockgen_fs1_0mhz_ns256_ed_off.dat");
        assert_eq!(
            storage::read_statistics(&off_path).unwrap(),
            outcome.vector("ed", &StimulusLevel::Off).unwrap().values()
        );
        assert!(dir
            .path()
            .join("mock_mockgen_fs1_0mhz_ns256_summary.json")
            .exists());

        let analyses = analyze_vectors(&outcome.vectors, &AnalysisParams::default()).unwrap();
        assert_eq!(analyses.len(), 1);
        let points = analyses[0].curve.points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].power, -90.0);
        assert_eq!(points[0].pd, 1.0);
    }

    #[test]
    fn rerunning_into_the_same_directory_is_refused() {
        let dir = tempdir().unwrap();
        let levels = vec![StimulusLevel::Off];
        let (source, generator) = bench(2, None);
        Campaign::new(spec(dir.path().to_path_buf(), levels.clone()))
            .run(source, generator)
            .unwrap();

        let (source, generator) = bench(3, None);
        let err = Campaign::new(spec(dir.path().to_path_buf(), levels))
            .run(source, generator)
            .unwrap_err();
        assert!(matches!(err, SenseError::OutputCollision(_)));
    }

    #[test]
    fn abort_policy_fails_the_campaign_on_capture_error() {
        let dir = tempdir().unwrap();
        let bad = StimulusLevel::Power { dbm: -80.0 };
        let (source, generator) = bench(4, Some(bad));
        let mut campaign = Campaign::new(spec(
            dir.path().to_path_buf(),
            vec![StimulusLevel::Off, bad, StimulusLevel::Power { dbm: -70.0 }],
        ));
        let err = campaign.run(source, generator).unwrap_err();
        assert!(matches!(err, SenseError::Capture(_)));
        assert_eq!(campaign.state(), CampaignState::Done);
    }

    #[test]
    fn continue_policy_records_missing_levels() {
        let dir = tempdir().unwrap();
        let bad = StimulusLevel::Power { dbm: -80.0 };
        let mut spec = spec(
            dir.path().to_path_buf(),
            vec![StimulusLevel::Off, bad, StimulusLevel::Power { dbm: -70.0 }],
        );
        spec.failure_policy = FailurePolicy::Continue;
        let (source, generator) = bench(5, Some(bad));
        let outcome = Campaign::new(spec).run(source, generator).unwrap();

        assert_eq!(outcome.missing, vec![bad]);
        assert_eq!(outcome.vectors.len(), 2);
        assert_eq!(outcome.metrics.failures, 1);
    }

    #[test]
    fn compensated_detectors_move_off_to_the_front() {
        let mut spec = spec(
            PathBuf::from("/unused"),
            vec![StimulusLevel::Power { dbm: -70.0 }, StimulusLevel::Off],
        );
        spec.detectors.push(DetectorSpec::Covariance {
            statistic: CovarianceStatistic::Cav,
            lags: 4,
            compensated: true,
        });
        assert_eq!(spec.sweep_order()[0], StimulusLevel::Off);

        spec.levels = vec![StimulusLevel::Power { dbm: -70.0 }];
        assert!(matches!(spec.validate(), Err(SenseError::Precondition(_))));
    }

    #[test]
    fn compensated_campaign_runs_with_off_last_in_configuration() {
        let dir = tempdir().unwrap();
        let mut spec = spec(
            dir.path().to_path_buf(),
            vec![StimulusLevel::Power { dbm: -70.0 }, StimulusLevel::Off],
        );
        spec.detectors = vec![DetectorSpec::Eigenvalue {
            statistic: EigenStatistic::Mme,
            lags: 4,
            compensated: true,
        }];
        let (source, generator) = bench(6, None);
        let outcome = Campaign::new(spec).run(source, generator).unwrap();
        assert_eq!(outcome.vectors[0].level(), StimulusLevel::Off);
        assert_eq!(outcome.vectors[0].detector(), "mme_l4_nc");
    }

    #[test]
    fn detector_that_cannot_fit_the_window_fails_under_continue_policy() {
        let dir = tempdir().unwrap();
        let mut spec = spec(
            dir.path().to_path_buf(),
            vec![StimulusLevel::Off, StimulusLevel::Power { dbm: -70.0 }],
        );
        spec.failure_policy = FailurePolicy::Continue;
        spec.sampling.window_len = 64;
        spec.detectors.push(DetectorSpec::Cyclostationary {
            statistic: CycloStatistic::Scf,
            fft_size: 128,
            smoothing: 32,
        });
        assert!(matches!(spec.validate(), Err(SenseError::Precondition(_))));

        let (source, generator) = bench(8, None);
        let result = Campaign::new(spec).run(source, generator);
        assert!(matches!(result, Err(SenseError::Precondition(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_off_capture_stops_compensated_campaign_under_continue_policy() {
        let dir = tempdir().unwrap();
        let mut spec = spec(
            dir.path().to_path_buf(),
            vec![StimulusLevel::Off, StimulusLevel::Power { dbm: -70.0 }],
        );
        spec.failure_policy = FailurePolicy::Continue;
        spec.detectors.push(DetectorSpec::Covariance {
            statistic: CovarianceStatistic::Cav,
            lags: 4,
            compensated: true,
        });
        let (source, generator) = bench(9, Some(StimulusLevel::Off));
        let result = Campaign::new(spec).run(source, generator);
        assert!(matches!(result, Err(SenseError::Precondition(_))));
        assert!(!dir
            .path()
            .join("mock_mockgen_fs1_0mhz_ns256_summary.json")
            .exists());
    }

    #[test]
    fn duplicate_levels_are_rejected() {
        let spec = spec(
            PathBuf::from("/unused"),
            vec![StimulusLevel::Off, StimulusLevel::Off],
        );
        assert!(matches!(spec.validate(), Err(SenseError::Precondition(_))));
    }
}

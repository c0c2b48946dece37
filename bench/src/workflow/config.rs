use crate::generator::{Spurious, SyntheticConfig, Waveform};
use crate::instrument::{CaptureToolConfig, ScpiConfig};
use anyhow::Context;
use sensecore::campaign::FailurePolicy;
use sensecore::detectors::{CovarianceStatistic, DetectorSpec, EigenStatistic};
use sensecore::prelude::{SamplingConfig, StimulusLevel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CARRIER_HZ: f64 = 864e6;
const HARDWARE_RATES: [(f64, usize); 3] = [(1e6, 25_000), (2e6, 25_000), (10e6, 100_000)];

fn default_carrier() -> f64 {
    CARRIER_HZ
}

fn default_window_count() -> usize {
    1000
}

fn default_extra_windows() -> usize {
    5
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_pool_size() -> usize {
    4
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatePair {
    pub sample_rate_hz: f64,
    pub window_len: usize,
}

/// Stimulus levels of a campaign, either listed or generated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LevelPlan {
    Explicit {
        levels: Vec<StimulusLevel>,
    },
    /// `Off` followed by `start_dbm..=stop_dbm`.
    PowerSweep {
        start_dbm: f64,
        stop_dbm: f64,
        step_db: f64,
    },
    /// `Off` followed by a fixed power at `start_hz..=stop_hz` from the carrier.
    OffsetSweep {
        dbm: f64,
        start_hz: f64,
        stop_hz: f64,
        step_hz: f64,
    },
}

fn inclusive_steps(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop < start {
        return vec![start];
    }
    let count = ((stop - start) / step + 1e-9).floor() as usize;
    (0..=count).map(|i| start + i as f64 * step).collect()
}

impl LevelPlan {
    pub fn power_sweep(start_dbm: f64, stop_dbm: f64, step_db: f64) -> Self {
        LevelPlan::PowerSweep {
            start_dbm,
            stop_dbm,
            step_db,
        }
    }

    pub fn expand(&self) -> Vec<StimulusLevel> {
        match self {
            LevelPlan::Explicit { levels } => levels.clone(),
            LevelPlan::PowerSweep {
                start_dbm,
                stop_dbm,
                step_db,
            } => std::iter::once(StimulusLevel::Off)
                .chain(
                    inclusive_steps(*start_dbm, *stop_dbm, *step_db)
                        .into_iter()
                        .map(|dbm| StimulusLevel::Power { dbm }),
                )
                .collect(),
            LevelPlan::OffsetSweep {
                dbm,
                start_hz,
                stop_hz,
                step_hz,
            } => std::iter::once(StimulusLevel::Off)
                .chain(
                    inclusive_steps(*start_hz, *stop_hz, *step_hz)
                        .into_iter()
                        .map(|offset_hz| StimulusLevel::FrequencyOffset {
                            offset_hz,
                            dbm: *dbm,
                        }),
                )
                .collect(),
        }
    }
}

/// Receiver/generator pair a campaign runs against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BenchConfig {
    Synthetic(SyntheticConfig),
    External {
        #[serde(default)]
        capture: CaptureToolConfig,
        generator: ScpiConfig,
    },
}

impl BenchConfig {
    pub fn label(&self) -> String {
        match self {
            BenchConfig::Synthetic(config) => format!("sim/{}", config.generator_slug()),
            BenchConfig::External { capture, generator } => {
                format!("{}/{}", capture.slug, generator.slug)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CampaignTemplate {
    pub name: String,
    #[serde(default = "default_carrier")]
    pub carrier_hz: f64,
    pub rates: Vec<RatePair>,
    #[serde(default = "default_window_count")]
    pub window_count: usize,
    /// Settling windows captured ahead of the measured ones and discarded.
    #[serde(default = "default_extra_windows")]
    pub extra_windows: usize,
    /// Place the stimulus a quarter of the sample rate above the carrier.
    #[serde(default)]
    pub quarter_rate_offset: bool,
    pub levels: LevelPlan,
    pub detectors: Vec<DetectorSpec>,
    pub benches: Vec<BenchConfig>,
    #[serde(default)]
    pub keep_raw: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl CampaignTemplate {
    pub fn sampling(&self, rate: &RatePair) -> SamplingConfig {
        SamplingConfig {
            carrier_hz: self.carrier_hz,
            sample_rate_hz: rate.sample_rate_hz,
            window_len: rate.window_len,
            window_count: self.window_count,
            extra: self.extra_windows * rate.window_len,
            stimulus_offset_hz: if self.quarter_rate_offset {
                rate.sample_rate_hz / 4.0
            } else {
                0.0
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub campaigns: Vec<CampaignTemplate>,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    /// Campaigns available without a workflow file.
    pub fn builtin() -> Self {
        Self {
            output_dir: default_output_dir(),
            pool_size: default_pool_size(),
            campaigns: vec![
                usrp_noise(),
                usrp_mic(),
                sim_mic(),
                sim_duty_cycle(),
                sim_spurious(),
                sim_offset(),
                sim_tone(),
            ],
        }
    }

    pub fn find(&self, name: &str) -> Option<&CampaignTemplate> {
        self.campaigns.iter().find(|campaign| campaign.name == name)
    }
}

fn hardware_rates() -> Vec<RatePair> {
    HARDWARE_RATES
        .iter()
        .map(|&(sample_rate_hz, window_len)| RatePair {
            sample_rate_hz,
            window_len,
        })
        .collect()
}

fn lag_suite() -> Vec<DetectorSpec> {
    DetectorSpec::standard_suite(&[5, 10, 15, 20])
}

fn template(name: &str, rates: Vec<RatePair>, levels: LevelPlan) -> CampaignTemplate {
    CampaignTemplate {
        name: name.into(),
        carrier_hz: CARRIER_HZ,
        rates,
        window_count: default_window_count(),
        extra_windows: default_extra_windows(),
        quarter_rate_offset: true,
        levels,
        detectors: lag_suite(),
        benches: Vec::new(),
        keep_raw: false,
        failure_policy: FailurePolicy::Abort,
    }
}

fn usrp_noise() -> CampaignTemplate {
    CampaignTemplate {
        benches: vec![BenchConfig::External {
            capture: CaptureToolConfig::default(),
            generator: ScpiConfig::preloaded("noise"),
        }],
        ..template(
            "usrp_noise",
            hardware_rates(),
            LevelPlan::power_sweep(-70.0, -12.0, 2.0),
        )
    }
}

fn usrp_mic() -> CampaignTemplate {
    CampaignTemplate {
        benches: vec![BenchConfig::External {
            capture: CaptureToolConfig::default(),
            generator: ScpiConfig::microphone(),
        }],
        ..template(
            "usrp_mic",
            hardware_rates(),
            LevelPlan::power_sweep(-100.0, -71.0, 1.0),
        )
    }
}

fn sim_mic() -> CampaignTemplate {
    let mut detectors = lag_suite();
    detectors.push(DetectorSpec::Eigenvalue {
        statistic: EigenStatistic::Mme,
        lags: 10,
        compensated: true,
    });
    CampaignTemplate {
        detectors,
        benches: vec![BenchConfig::Synthetic(SyntheticConfig::new(
            Waveform::microphone(),
        ))],
        ..template(
            "sim_mic",
            hardware_rates(),
            LevelPlan::power_sweep(-100.0, -71.0, 1.0),
        )
    }
}

fn sim_duty_cycle() -> CampaignTemplate {
    let benches = inclusive_steps(10.0, 100.0, 2.0)
        .into_iter()
        .map(|percent| {
            BenchConfig::Synthetic(SyntheticConfig::new(Waveform::duty_cycle(percent / 100.0)))
        })
        .collect();
    CampaignTemplate {
        benches,
        ..template(
            "sim_dc",
            hardware_rates(),
            LevelPlan::Explicit {
                levels: vec![StimulusLevel::Off, StimulusLevel::Power { dbm: -60.0 }],
            },
        )
    }
}

fn sim_spurious() -> CampaignTemplate {
    let sample_rate_hz = 2e6;
    // clean baseline first
    let mut benches = vec![BenchConfig::Synthetic(SyntheticConfig::new(
        Waveform::microphone(),
    ))];
    for dbm in inclusive_steps(-130.0, -102.0, 2.0) {
        for divisor in [4.0, 8.0, 32.0, 128.0] {
            let mut config = SyntheticConfig::new(Waveform::microphone());
            config.spurious = Some(Spurious {
                offset_hz: sample_rate_hz / divisor,
                dbm,
            });
            benches.push(BenchConfig::Synthetic(config));
        }
    }

    let mut detectors = vec![DetectorSpec::Energy];
    for lags in [5, 10, 15, 20] {
        for statistic in [CovarianceStatistic::Cav, CovarianceStatistic::Mac] {
            detectors.push(DetectorSpec::Covariance {
                statistic,
                lags,
                compensated: false,
            });
        }
    }

    CampaignTemplate {
        detectors,
        benches,
        ..template(
            "sim_spurious",
            vec![RatePair {
                sample_rate_hz,
                window_len: 25_000,
            }],
            LevelPlan::power_sweep(-100.0, -81.0, 1.0),
        )
    }
}

fn sim_offset() -> CampaignTemplate {
    CampaignTemplate {
        quarter_rate_offset: false,
        detectors: vec![DetectorSpec::Energy],
        benches: vec![BenchConfig::Synthetic(SyntheticConfig::new(Waveform::Tone))],
        ..template(
            "sim_offset",
            vec![RatePair {
                sample_rate_hz: 2e6,
                window_len: 25_000,
            }],
            LevelPlan::OffsetSweep {
                dbm: -70.0,
                start_hz: 0.0,
                stop_hz: 1.5e6,
                step_hz: 100e3,
            },
        )
    }
}

/// Small, fast sweep for trying the bench end to end.
fn sim_tone() -> CampaignTemplate {
    CampaignTemplate {
        window_count: 200,
        extra_windows: 1,
        detectors: vec![
            DetectorSpec::Energy,
            DetectorSpec::Covariance {
                statistic: CovarianceStatistic::Cav,
                lags: 10,
                compensated: false,
            },
            DetectorSpec::Eigenvalue {
                statistic: EigenStatistic::Mme,
                lags: 10,
                compensated: false,
            },
            DetectorSpec::Eigenvalue {
                statistic: EigenStatistic::Mme,
                lags: 10,
                compensated: true,
            },
        ],
        benches: vec![BenchConfig::Synthetic(SyntheticConfig::new(Waveform::Tone))],
        ..template(
            "sim_tone",
            vec![RatePair {
                sample_rate_hz: 1e6,
                window_len: 1000,
            }],
            LevelPlan::power_sweep(-110.0, -90.0, 2.0),
        )
    }
}

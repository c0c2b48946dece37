//! Detection statistics computed on one window of real samples.
//!
//! Workers receive [`DetectorSpec`] descriptions and build [`Detector`]
//! instances locally; noise-compensated specs additionally need a reference
//! window captured with the stimulus off.

pub mod covariance;
pub mod cyclostationary;
pub mod eigenvalue;
pub mod energy;

pub use covariance::{CovarianceDetector, CovarianceStatistic};
pub use cyclostationary::{CycloStatistic, CyclostationaryDetector};
pub use eigenvalue::{EigenStatistic, EigenvalueDetector};
pub use energy::{EnergyDetector, PowerSumDetector};

use crate::math::fam::FamEstimator;
use crate::prelude::{SenseError, SenseResult};
use serde::{Deserialize, Serialize};

/// A statistic computed independently on each window.
pub trait WindowDetector {
    /// Slug used in output file names.
    fn name(&self) -> String;
    fn compute(&self, window: &[f64]) -> SenseResult<f64>;
}

/// Serializable description of a detector and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorSpec {
    Energy,
    Covariance {
        statistic: CovarianceStatistic,
        lags: usize,
        #[serde(default)]
        compensated: bool,
    },
    Eigenvalue {
        statistic: EigenStatistic,
        lags: usize,
        #[serde(default)]
        compensated: bool,
    },
    Cyclostationary {
        statistic: CycloStatistic,
        fft_size: usize,
        smoothing: usize,
    },
    PowerSum {
        block: usize,
    },
}

impl DetectorSpec {
    pub fn needs_reference(&self) -> bool {
        matches!(
            self,
            DetectorSpec::Covariance {
                compensated: true,
                ..
            } | DetectorSpec::Eigenvalue {
                compensated: true,
                ..
            }
        )
    }

    /// Rejects parameters that cannot be evaluated on windows of `window_len` samples.
    pub fn check_window_len(&self, window_len: usize) -> SenseResult<()> {
        let checked = match self {
            DetectorSpec::Energy => Ok(()),
            DetectorSpec::Covariance {
                statistic, lags, ..
            } => CovarianceDetector::new(*statistic, *lags)
                .and_then(|_| lags_fit(*lags, window_len)),
            DetectorSpec::Eigenvalue {
                statistic, lags, ..
            } => EigenvalueDetector::new(*statistic, *lags)
                .and_then(|_| lags_fit(*lags, window_len)),
            DetectorSpec::Cyclostationary {
                fft_size,
                smoothing,
                ..
            } => FamEstimator::new(*fft_size, *smoothing)
                .and_then(|estimator| estimator.check_len(window_len)),
            DetectorSpec::PowerSum { block } => {
                if *block != window_len {
                    Err(SenseError::Precondition(format!(
                        "power-sum block of {} samples does not match window length {}",
                        block, window_len
                    )))
                } else {
                    PowerSumDetector::new(*block).map(|_| ())
                }
            }
        };
        checked.map_err(|err| match err {
            SenseError::Precondition(reason) => {
                SenseError::Precondition(format!("{}: {}", self.name(), reason))
            }
            other => other,
        })
    }

    /// Builds a detector that does not need a noise reference.
    pub fn build(&self) -> SenseResult<Detector> {
        let detector = match self {
            DetectorSpec::Energy => Detector::Energy(EnergyDetector),
            DetectorSpec::Covariance {
                statistic,
                lags,
                compensated: false,
            } => Detector::Covariance(CovarianceDetector::new(*statistic, *lags)?),
            DetectorSpec::Eigenvalue {
                statistic,
                lags,
                compensated: false,
            } => Detector::Eigenvalue(EigenvalueDetector::new(*statistic, *lags)?),
            DetectorSpec::Cyclostationary {
                statistic,
                fft_size,
                smoothing,
            } => Detector::Cyclostationary(CyclostationaryDetector::new(
                *statistic, *fft_size, *smoothing,
            )?),
            DetectorSpec::PowerSum { block } => Detector::PowerSum(PowerSumDetector::new(*block)?),
            DetectorSpec::Covariance { .. } | DetectorSpec::Eigenvalue { .. } => {
                return Err(SenseError::Precondition(format!(
                    "{} needs a noise reference window",
                    self.name()
                )))
            }
        };
        Ok(detector)
    }

    /// Builds the detector, capturing a noise reference when the spec asks for one.
    pub fn build_with_reference(&self, reference: &[f64]) -> SenseResult<Detector> {
        match self {
            DetectorSpec::Covariance {
                statistic,
                lags,
                compensated: true,
            } => Ok(Detector::Covariance(CovarianceDetector::compensated(
                *statistic, *lags, reference,
            )?)),
            DetectorSpec::Eigenvalue {
                statistic,
                lags,
                compensated: true,
            } => Ok(Detector::Eigenvalue(EigenvalueDetector::compensated(
                *statistic, *lags, reference,
            )?)),
            _ => self.build(),
        }
    }

    /// Name of the detector this spec builds.
    pub fn name(&self) -> String {
        let suffix = if self.needs_reference() { "_nc" } else { "" };
        match self {
            DetectorSpec::Energy => "ed".to_string(),
            DetectorSpec::Covariance {
                statistic, lags, ..
            } => format!("{}_l{}{}", statistic.slug(), lags, suffix),
            DetectorSpec::Eigenvalue {
                statistic, lags, ..
            } => format!("{}_l{}{}", statistic.slug(), lags, suffix),
            DetectorSpec::Cyclostationary {
                statistic,
                fft_size,
                smoothing,
            } => format!("{}_np{}_l{}", statistic.slug(), fft_size, smoothing),
            DetectorSpec::PowerSum { block } => format!("psum_b{}", block),
        }
    }

    /// Energy plus every covariance and eigenvalue statistic for each lag count.
    pub fn standard_suite(lag_counts: &[usize]) -> Vec<DetectorSpec> {
        let mut specs = vec![DetectorSpec::Energy];
        for &lags in lag_counts {
            for statistic in [
                CovarianceStatistic::Cav,
                CovarianceStatistic::Cfn,
                CovarianceStatistic::Mac,
            ] {
                specs.push(DetectorSpec::Covariance {
                    statistic,
                    lags,
                    compensated: false,
                });
            }
            for statistic in [
                EigenStatistic::Mme,
                EigenStatistic::Eme,
                EigenStatistic::Agm,
                EigenStatistic::Met,
            ] {
                specs.push(DetectorSpec::Eigenvalue {
                    statistic,
                    lags,
                    compensated: false,
                });
            }
        }
        specs
    }
}

fn lags_fit(lags: usize, window_len: usize) -> SenseResult<()> {
    if lags > window_len {
        return Err(SenseError::Precondition(format!(
            "{} lags do not fit a window of {} samples",
            lags, window_len
        )));
    }
    Ok(())
}

/// Tagged union over the detector families.
#[derive(Debug, Clone, PartialEq)]
pub enum Detector {
    Energy(EnergyDetector),
    Covariance(CovarianceDetector),
    Eigenvalue(EigenvalueDetector),
    Cyclostationary(CyclostationaryDetector),
    PowerSum(PowerSumDetector),
}

impl WindowDetector for Detector {
    fn name(&self) -> String {
        match self {
            Detector::Energy(d) => d.name(),
            Detector::Covariance(d) => d.name(),
            Detector::Eigenvalue(d) => d.name(),
            Detector::Cyclostationary(d) => d.name(),
            Detector::PowerSum(d) => d.name(),
        }
    }

    fn compute(&self, window: &[f64]) -> SenseResult<f64> {
        match self {
            Detector::Energy(d) => d.compute(window),
            Detector::Covariance(d) => d.compute(window),
            Detector::Eigenvalue(d) => d.compute(window),
            Detector::Cyclostationary(d) => d.compute(window),
            Detector::PowerSum(d) => d.compute(window),
        }
    }
}

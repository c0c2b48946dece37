use crate::detectors::covariance::autocorrelation;
use crate::detectors::WindowDetector;
use crate::math::matrix::MatrixHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{SenseError, SenseResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EigenStatistic {
    /// Maximum-minimum eigenvalue ratio.
    Mme,
    /// Energy with minimum eigenvalue.
    Eme,
    /// Arithmetic to geometric mean.
    Agm,
    /// Maximum eigenvalue to trace.
    Met,
}

impl EigenStatistic {
    pub fn slug(&self) -> &'static str {
        match self {
            EigenStatistic::Mme => "mme",
            EigenStatistic::Eme => "eme",
            EigenStatistic::Agm => "agm",
            EigenStatistic::Met => "met",
        }
    }
}

/// Ascending eigenvalues of the Toeplitz covariance of `window`.
pub fn covariance_eigenvalues(window: &[f64], lags: usize) -> SenseResult<Vec<f64>> {
    let r = autocorrelation(window, lags)?;
    Ok(MatrixHelper::symmetric_eigenvalues(&MatrixHelper::toeplitz(&r)))
}

/// Noise-only eigenvalues captured once from an `Off` window.
#[derive(Debug, Clone, PartialEq)]
struct EigenReference {
    eigenvalues: Vec<f64>,
    window_len: usize,
}

/// Eigenvalue-based detectors on the same covariance as the covariance family.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenvalueDetector {
    statistic: EigenStatistic,
    lags: usize,
    reference: Option<EigenReference>,
}

impl EigenvalueDetector {
    pub fn new(statistic: EigenStatistic, lags: usize) -> SenseResult<Self> {
        if lags < 2 {
            return Err(SenseError::Precondition(format!(
                "eigenvalue detectors need at least 2 lags, got {}",
                lags
            )));
        }
        Ok(Self {
            statistic,
            lags,
            reference: None,
        })
    }

    pub fn compensated(
        statistic: EigenStatistic,
        lags: usize,
        reference_window: &[f64],
    ) -> SenseResult<Self> {
        let mut detector = Self::new(statistic, lags)?;
        let eigenvalues = covariance_eigenvalues(reference_window, lags)?;
        if eigenvalues.iter().any(|&v| v.is_nan() || v <= 0.0) {
            return Err(SenseError::Precondition(
                "noise reference covariance is not positive definite".into(),
            ));
        }
        detector.reference = Some(EigenReference {
            eigenvalues,
            window_len: reference_window.len(),
        });
        Ok(detector)
    }

    /// Ascending eigenvalues, normalised by the noise reference when present.
    pub fn eigenvalues(&self, window: &[f64]) -> SenseResult<Vec<f64>> {
        let mut eigenvalues = covariance_eigenvalues(window, self.lags)?;
        if let Some(reference) = &self.reference {
            if window.len() != reference.window_len {
                return Err(SenseError::Precondition(format!(
                    "window of {} samples does not match the {}-sample noise reference",
                    window.len(),
                    reference.window_len
                )));
            }
            for (value, noise) in eigenvalues.iter_mut().zip(&reference.eigenvalues) {
                *value /= noise;
            }
            eigenvalues.sort_by(|a, b| a.total_cmp(b));
        }
        Ok(eigenvalues)
    }
}

impl WindowDetector for EigenvalueDetector {
    fn name(&self) -> String {
        let suffix = if self.reference.is_some() { "_nc" } else { "" };
        format!("{}_l{}{}", self.statistic.slug(), self.lags, suffix)
    }

    fn compute(&self, window: &[f64]) -> SenseResult<f64> {
        let eigenvalues = self.eigenvalues(window)?;
        let min = eigenvalues[0];
        let max = eigenvalues[eigenvalues.len() - 1];

        let value = match self.statistic {
            EigenStatistic::Mme => max / min,
            // raw window energy against the mean-removed covariance
            EigenStatistic::Eme => StatsHelper::energy(window) / min,
            EigenStatistic::Agm => {
                let log_mean = eigenvalues.iter().map(|v| v.ln()).sum::<f64>()
                    / eigenvalues.len() as f64;
                StatsHelper::mean(&eigenvalues) / log_mean.exp()
            }
            EigenStatistic::Met => max / eigenvalues.iter().sum::<f64>(),
        };
        Ok(value)
    }
}

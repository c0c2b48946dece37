use crate::detectors::WindowDetector;
use crate::math::matrix::MatrixHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{SenseError, SenseResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceStatistic {
    /// Covariance absolute value.
    Cav,
    /// Covariance Frobenius norm.
    Cfn,
    /// Maximum autocorrelation.
    Mac,
}

impl CovarianceStatistic {
    pub fn slug(&self) -> &'static str {
        match self {
            CovarianceStatistic::Cav => "cav",
            CovarianceStatistic::Cfn => "cfn",
            CovarianceStatistic::Mac => "mac",
        }
    }
}

/// Autocorrelation of the mean-removed window for lags `0..lags`.
///
/// Lag `l` is the dot product of the overlapping parts divided by `N - l`.
pub fn autocorrelation(window: &[f64], lags: usize) -> SenseResult<Vec<f64>> {
    if lags < 2 {
        return Err(SenseError::Precondition(format!(
            "covariance detectors need at least 2 lags, got {}",
            lags
        )));
    }
    if window.len() < lags {
        return Err(SenseError::Precondition(format!(
            "window of {} samples is shorter than {} lags",
            window.len(),
            lags
        )));
    }

    let mean = StatsHelper::mean(window);
    let centred: Vec<f64> = window.iter().map(|v| v - mean).collect();
    let n = centred.len();

    Ok((0..lags)
        .map(|lag| {
            let dot: f64 = centred[..n - lag]
                .iter()
                .zip(&centred[lag..])
                .map(|(a, b)| a * b)
                .sum();
            dot / (n - lag) as f64
        })
        .collect())
}

/// Noise-only lag sequence captured once from an `Off` window.
#[derive(Debug, Clone, PartialEq)]
pub struct LagReference {
    lags: Vec<f64>,
    window_len: usize,
}

impl LagReference {
    pub fn capture(window: &[f64], lags: usize) -> SenseResult<Self> {
        Ok(Self {
            lags: autocorrelation(window, lags)?,
            window_len: window.len(),
        })
    }

    pub fn lags(&self) -> &[f64] {
        &self.lags
    }

    pub(crate) fn check_len(&self, len: usize) -> SenseResult<()> {
        if len != self.window_len {
            return Err(SenseError::Precondition(format!(
                "window of {} samples does not match the {}-sample noise reference",
                len, self.window_len
            )));
        }
        Ok(())
    }

    /// Removes the correlated part of the noise; lag 0 is left untouched.
    fn subtract_from(&self, lags: &mut [f64]) {
        for (value, noise) in lags.iter_mut().zip(&self.lags).skip(1) {
            *value -= noise;
        }
    }
}

/// Covariance-based detectors built on the Toeplitz autocorrelation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceDetector {
    statistic: CovarianceStatistic,
    lags: usize,
    reference: Option<LagReference>,
}

impl CovarianceDetector {
    pub fn new(statistic: CovarianceStatistic, lags: usize) -> SenseResult<Self> {
        if lags < 2 {
            return Err(SenseError::Precondition(format!(
                "covariance detectors need at least 2 lags, got {}",
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
        statistic: CovarianceStatistic,
        lags: usize,
        reference_window: &[f64],
    ) -> SenseResult<Self> {
        let mut detector = Self::new(statistic, lags)?;
        detector.reference = Some(LagReference::capture(reference_window, lags)?);
        Ok(detector)
    }

    /// Toeplitz matrix used by the statistic, after noise compensation.
    pub fn covariance(&self, window: &[f64]) -> SenseResult<Array2<f64>> {
        let mut lags = autocorrelation(window, self.lags)?;
        if let Some(reference) = &self.reference {
            reference.check_len(window.len())?;
            reference.subtract_from(&mut lags);
        }
        Ok(MatrixHelper::toeplitz(&lags))
    }
}

impl WindowDetector for CovarianceDetector {
    fn name(&self) -> String {
        let suffix = if self.reference.is_some() { "_nc" } else { "" };
        format!("{}_l{}{}", self.statistic.slug(), self.lags, suffix)
    }

    fn compute(&self, window: &[f64]) -> SenseResult<f64> {
        let r = self.covariance(window)?;
        let lags = self.lags as f64;
        let r00 = r[[0, 0]];

        let value = match self.statistic {
            CovarianceStatistic::Cav => r.iter().map(|v| v.abs()).sum::<f64>() / lags / r00.abs(),
            CovarianceStatistic::Cfn => r.iter().map(|v| v * v).sum::<f64>() / lags / (r00 * r00),
            CovarianceStatistic::Mac => {
                r.row(0).iter().skip(1).fold(0.0_f64, |max, v| max.max(v.abs())) / r00.abs()
            }
        };
        Ok(value)
    }
}

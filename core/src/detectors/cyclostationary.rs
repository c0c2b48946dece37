use crate::detectors::WindowDetector;
use crate::math::fam::{FamEstimator, SpectralSurface};
use crate::prelude::{SenseError, SenseResult};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycloStatistic {
    /// Off-diagonal correlation relative to the power spectrum.
    Scf,
    /// Raw off-diagonal correlation magnitude.
    Can,
}

impl CycloStatistic {
    pub fn slug(&self) -> &'static str {
        match self {
            CycloStatistic::Scf => "scf",
            CycloStatistic::Can => "can",
        }
    }
}

/// Detectors based on the FAM spectral correlation surface.
#[derive(Debug, Clone, PartialEq)]
pub struct CyclostationaryDetector {
    statistic: CycloStatistic,
    estimator: FamEstimator,
}

impl CyclostationaryDetector {
    pub fn new(statistic: CycloStatistic, fft_size: usize, smoothing: usize) -> SenseResult<Self> {
        Ok(Self {
            statistic,
            estimator: FamEstimator::new(fft_size, smoothing)?,
        })
    }

    fn score(&self, estimate: &SpectralSurface) -> f64 {
        let zero_alpha = estimate.zero_alpha_column();
        let mut best = 0.0_f64;

        for row in estimate.surface.rows() {
            let off_diagonal = row
                .iter()
                .enumerate()
                .filter(|(column, _)| estimate.is_off_diagonal(*column))
                .fold(0.0_f64, |max, (_, value)| max.max(value.norm()));

            let candidate = match self.statistic {
                CycloStatistic::Can => off_diagonal,
                CycloStatistic::Scf => {
                    let psd = row[zero_alpha].norm();
                    if psd > 0.0 {
                        off_diagonal / psd
                    } else {
                        continue;
                    }
                }
            };
            best = best.max(candidate);
        }
        best
    }
}

impl WindowDetector for CyclostationaryDetector {
    fn name(&self) -> String {
        format!(
            "{}_np{}_l{}",
            self.statistic.slug(),
            self.estimator.channels(),
            self.estimator.hop()
        )
    }

    fn compute(&self, window: &[f64]) -> SenseResult<f64> {
        if window.len() < self.estimator.channels() {
            return Err(SenseError::Precondition(format!(
                "window of {} samples is shorter than FFT size {}",
                window.len(),
                self.estimator.channels()
            )));
        }
        let samples: Vec<Complex64> = window.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        let estimate = self.estimator.estimate(&samples)?;
        Ok(self.score(&estimate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::{Distribution, Normal};
    use std::f64::consts::PI;

    #[test]
    fn names_encode_parameters() {
        let scf = CyclostationaryDetector::new(CycloStatistic::Scf, 16, 4).unwrap();
        assert_eq!(scf.name(), "scf_np16_l4");
    }

    #[test]
    fn statistics_are_finite_and_non_negative() {
        let mut rng = StdRng::seed_from_u64(21);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let window: Vec<f64> = (0..512).map(|_| normal.sample(&mut rng)).collect();

        for statistic in [CycloStatistic::Scf, CycloStatistic::Can] {
            let detector = CyclostationaryDetector::new(statistic, 8, 2).unwrap();
            let value = detector.compute(&window).unwrap();
            assert!(value.is_finite() && value >= 0.0);
        }
    }

    #[test]
    fn can_grows_with_signal_amplitude() {
        let bpsk: Vec<f64> = (0..512)
            .map(|n| {
                let symbol = if (n / 8) % 3 == 0 { -1.0 } else { 1.0 };
                symbol * (2.0 * PI * 0.2 * n as f64).cos()
            })
            .collect();
        let louder: Vec<f64> = bpsk.iter().map(|v| v * 3.0).collect();
        let can = CyclostationaryDetector::new(CycloStatistic::Can, 8, 2).unwrap();
        let quiet = can.compute(&bpsk).unwrap();
        let loud = can.compute(&louder).unwrap();
        // second-order statistic: scales with amplitude squared
        assert!((loud - 9.0 * quiet).abs() <= 1e-9 * loud.max(1.0));
    }

    #[test]
    fn short_window_is_rejected() {
        let scf = CyclostationaryDetector::new(CycloStatistic::Scf, 32, 4).unwrap();
        assert!(matches!(
            scf.compute(&[0.0; 16]),
            Err(SenseError::Precondition(_))
        ));
    }
}

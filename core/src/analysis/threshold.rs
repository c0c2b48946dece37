use crate::math::stats::StatsHelper;
use crate::prelude::{SenseError, SenseResult, StatisticVector};
use serde::{Deserialize, Serialize};

/// Empirical CDF of a sample: sorted values and `P(i) = i / n`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalCdf {
    pub values: Vec<f64>,
    pub probabilities: Vec<f64>,
}

impl EmpiricalCdf {
    pub fn new(samples: &[f64]) -> Self {
        let values = StatsHelper::sorted(samples);
        let n = values.len() as f64;
        let probabilities = (0..values.len()).map(|i| i as f64 / n).collect();
        Self {
            values,
            probabilities,
        }
    }

    /// Value at cumulative probability `p`, clamped to the sample range.
    pub fn quantile(&self, p: f64) -> Option<f64> {
        let first = *self.values.first()?;
        let last = *self.values.last()?;
        Some(StatsHelper::interp(
            p,
            &self.probabilities,
            &self.values,
            first,
            last,
        ))
    }
}

/// Decision threshold calibrated on the noise-only statistics of one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    detector: String,
    pfa: f64,
    gamma0: f64,
}

impl Threshold {
    /// Calibrates on an `Off` vector.
    pub fn calibrate(off: &StatisticVector, pfa: f64) -> SenseResult<Self> {
        if !off.level().is_off() {
            return Err(SenseError::Precondition(format!(
                "threshold for {} must be calibrated on the off level, got {}",
                off.detector(),
                off.level()
            )));
        }
        Self::from_values(off.detector(), off.values(), pfa)
    }

    pub fn from_values(detector: &str, values: &[f64], pfa: f64) -> SenseResult<Self> {
        if values.is_empty() {
            return Err(SenseError::Precondition(format!(
                "no noise-only statistics for {}",
                detector
            )));
        }
        if !(pfa > 0.0 && pfa < 1.0) {
            return Err(SenseError::Precondition(format!(
                "false-alarm probability {} outside (0, 1)",
                pfa
            )));
        }
        let cdf = EmpiricalCdf::new(values);
        let gamma0 = cdf
            .quantile(1.0 - pfa)
            .ok_or_else(|| SenseError::Internal("empty cdf".into()))?;
        Ok(Self {
            detector: detector.to_string(),
            pfa,
            gamma0,
        })
    }

    pub fn detector(&self) -> &str {
        &self.detector
    }

    pub fn pfa(&self) -> f64 {
        self.pfa
    }

    pub fn gamma0(&self) -> f64 {
        self.gamma0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::{EnergyDetector, WindowDetector};
    use crate::prelude::{SamplingConfig, StimulusLevel};
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    fn sampling() -> SamplingConfig {
        SamplingConfig {
            carrier_hz: 864e6,
            sample_rate_hz: 1e6,
            window_len: 25_000,
            window_count: 1000,
            extra: 0,
            stimulus_offset_hz: 0.0,
        }
    }

    #[test]
    fn cdf_uses_left_closed_probabilities() {
        let cdf = EmpiricalCdf::new(&[3.0, 1.0, 2.0, 4.0]);
        assert_eq!(cdf.values, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(cdf.probabilities, vec![0.0, 0.25, 0.5, 0.75]);
        assert_eq!(cdf.quantile(0.625), Some(3.5));
        assert_eq!(cdf.quantile(0.9), Some(4.0));
    }

    #[test]
    fn false_alarm_rate_is_within_one_sample() {
        let mut rng = StdRng::seed_from_u64(99);
        let normal = Normal::new(10.0, 2.0).unwrap();
        for n in [10usize, 57, 1000] {
            let values: Vec<f64> = (0..n).map(|_| normal.sample(&mut rng)).collect();
            for pfa in [0.01, 0.1, 0.5] {
                let threshold = Threshold::from_values("ed", &values, pfa).unwrap();
                let above = StatsHelper::fraction_above(&values, threshold.gamma0());
                assert!((above - pfa).abs() <= 1.0 / n as f64 + 1e-12, "n={} pfa={}", n, pfa);

                let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                assert!(threshold.gamma0() >= min && threshold.gamma0() <= max);
            }
        }
    }

    #[test]
    fn gaussian_energy_threshold_matches_chi_squared_quantile() {
        let mut rng = StdRng::seed_from_u64(2024);
        let normal = Normal::new(0.0f64, 1.0).unwrap();
        let energies: Vec<f64> = (0..1000)
            .map(|_| {
                let window: Vec<f64> = (0..25_000).map(|_| normal.sample(&mut rng)).collect();
                EnergyDetector.compute(&window).unwrap()
            })
            .collect();

        let mean = StatsHelper::mean(&energies);
        assert!((mean - 25_000.0).abs() < 30.0, "mean energy {}", mean);

        let off = StatisticVector::with_values("ed", StimulusLevel::Off, sampling(), energies);
        let threshold = Threshold::calibrate(&off, 0.1).unwrap();
        // chi-squared(25000) 90th percentile is 25000 + 1.2816 * sqrt(50000)
        assert!(
            (threshold.gamma0() - 25_286.6).abs() < 60.0,
            "gamma0 {}",
            threshold.gamma0()
        );
    }

    #[test]
    fn calibration_rejects_signal_levels_and_bad_pfa() {
        let signal = StatisticVector::with_values(
            "ed",
            StimulusLevel::Power { dbm: -70.0 },
            sampling(),
            vec![1.0, 2.0],
        );
        assert!(matches!(
            Threshold::calibrate(&signal, 0.1),
            Err(SenseError::Precondition(_))
        ));
        assert!(Threshold::from_values("ed", &[1.0], 0.0).is_err());
        assert!(Threshold::from_values("ed", &[], 0.1).is_err());
    }
}

use crate::detectors::WindowDetector;
use crate::math::stats::StatsHelper;
use crate::prelude::{SenseError, SenseResult};

/// Sum of squares of the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnergyDetector;

impl WindowDetector for EnergyDetector {
    fn name(&self) -> String {
        "ed".to_string()
    }

    fn compute(&self, window: &[f64]) -> SenseResult<f64> {
        if window.is_empty() {
            return Err(SenseError::Precondition("energy of an empty window".into()));
        }
        Ok(StatsHelper::energy(window))
    }
}

/// Mean block power in dB, as reported by sweeping sensors with a fixed block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerSumDetector {
    block: usize,
}

impl PowerSumDetector {
    pub fn new(block: usize) -> SenseResult<Self> {
        if block == 0 {
            return Err(SenseError::Precondition("power-sum block size must be positive".into()));
        }
        Ok(Self { block })
    }

    pub fn block(&self) -> usize {
        self.block
    }
}

impl WindowDetector for PowerSumDetector {
    fn name(&self) -> String {
        format!("psum_b{}", self.block)
    }

    fn compute(&self, window: &[f64]) -> SenseResult<f64> {
        if window.len() != self.block {
            return Err(SenseError::Precondition(format!(
                "power-sum detector expects blocks of {} samples, got {}",
                self.block,
                window.len()
            )));
        }
        Ok(10.0 * (StatsHelper::energy(window) / self.block as f64).log10())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_scales_with_square_of_amplitude() {
        let window: Vec<f64> = (0..64).map(|i| ((i * 7 % 13) as f64 - 6.0) * 0.1).collect();
        let base = EnergyDetector.compute(&window).unwrap();
        for a in [0.5, 2.0, 3.7] {
            let scaled: Vec<f64> = window.iter().map(|v| v * a).collect();
            let value = EnergyDetector.compute(&scaled).unwrap();
            assert!((value - a * a * base).abs() <= 1e-9 * value.abs().max(1.0));
        }
    }

    #[test]
    fn power_sum_requires_exact_block() {
        let detector = PowerSumDetector::new(4).unwrap();
        assert_eq!(detector.name(), "psum_b4");
        assert!((detector.compute(&[1.0, -1.0, 1.0, -1.0]).unwrap()).abs() < 1e-12);
        assert!(matches!(
            detector.compute(&[1.0; 5]),
            Err(SenseError::Precondition(_))
        ));
    }
}

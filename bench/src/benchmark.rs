use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use sensecore::detectors::{DetectorSpec, WindowDetector};
use std::time::{Duration, Instant};

/// Noise scale of the benchmark windows, close to a real receiver's floor.
const NOISE_SCALE: f64 = 3.3e-5;

#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkRow {
    pub detector: String,
    pub window_len: usize,
    /// Best per-call time over all repeats, in microseconds.
    pub micros: f64,
}

pub struct BenchmarkPlan {
    pub detectors: Vec<DetectorSpec>,
    pub window_lens: Vec<usize>,
    pub repeat: usize,
    pub number: usize,
    pub seed: u64,
}

impl Default for BenchmarkPlan {
    fn default() -> Self {
        Self {
            detectors: DetectorSpec::standard_suite(&[5, 10, 15, 20]),
            window_lens: vec![25_000, 50_000, 100_000],
            repeat: 10,
            number: 100,
            seed: 0,
        }
    }
}

/// Times every detector on one Gaussian window per window length.
pub fn run(plan: &BenchmarkPlan) -> anyhow::Result<Vec<BenchmarkRow>> {
    let normal = Normal::new(0.0, NOISE_SCALE).context("benchmark noise distribution")?;
    let mut rng = StdRng::seed_from_u64(plan.seed);
    let number = plan.number.max(1);

    let mut rows = Vec::with_capacity(plan.window_lens.len() * plan.detectors.len());
    for &window_len in &plan.window_lens {
        let window: Vec<f64> = (0..window_len).map(|_| normal.sample(&mut rng)).collect();
        for spec in &plan.detectors {
            let detector = spec
                .build_with_reference(&window)
                .with_context(|| format!("building {}", spec.name()))?;
            let mut best = Duration::MAX;
            for _ in 0..plan.repeat.max(1) {
                let start = Instant::now();
                for _ in 0..number {
                    detector
                        .compute(&window)
                        .with_context(|| format!("{} on {} samples", spec.name(), window_len))?;
                }
                best = best.min(start.elapsed());
            }
            let row = BenchmarkRow {
                detector: detector.name(),
                window_len,
                micros: best.as_secs_f64() * 1e6 / number as f64,
            };
            log::debug!("[benchmark] {:?}", row);
            rows.push(row);
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_row_per_detector_and_window_length() {
        let plan = BenchmarkPlan {
            detectors: DetectorSpec::standard_suite(&[5]),
            window_lens: vec![500, 1000],
            repeat: 2,
            number: 3,
            seed: 4,
        };
        let rows = run(&plan).unwrap();
        assert_eq!(rows.len(), 2 * 8);
        assert_eq!(rows[0].detector, "ed");
        assert_eq!(rows[0].window_len, 500);
        assert_eq!(rows[8].window_len, 1000);
        assert!(rows.iter().all(|row| row.micros >= 0.0));
    }
}

use crate::analysis::threshold::Threshold;
use crate::math::stats::StatsHelper;
use crate::prelude::{StatisticVector, StimulusLevel};
use serde::{Deserialize, Serialize};

/// Fraction of `values` strictly above the calibrated threshold.
pub fn detection_probability(values: &[f64], threshold: &Threshold) -> f64 {
    StatsHelper::fraction_above(values, threshold.gamma0())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Receiver input power in dBm, or absolute frequency offset in Hz.
    pub power: f64,
    pub pd: f64,
}

/// Detection probability against receiver input power for one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceCurve {
    detector: String,
    gamma0: f64,
    points: Vec<CurvePoint>,
}

impl PerformanceCurve {
    /// Builds the curve from per-level statistics; `Off` levels are skipped.
    pub fn build<'a, I>(threshold: &Threshold, levels: I, attenuation_db: f64) -> Self
    where
        I: IntoIterator<Item = (StimulusLevel, &'a [f64])>,
    {
        let mut points: Vec<CurvePoint> = levels
            .into_iter()
            .filter_map(|(level, values)| {
                let power = level.receiver_power(attenuation_db)?;
                Some(CurvePoint {
                    power,
                    pd: detection_probability(values, threshold),
                })
            })
            .collect();
        points.sort_by(|a, b| a.power.total_cmp(&b.power));

        Self {
            detector: threshold.detector().to_string(),
            gamma0: threshold.gamma0(),
            points,
        }
    }

    /// Curve over the vectors of a campaign that belong to the threshold's detector.
    pub fn from_vectors(
        threshold: &Threshold,
        vectors: &[StatisticVector],
        attenuation_db: f64,
    ) -> Self {
        let levels = vectors
            .iter()
            .filter(|vector| vector.detector() == threshold.detector())
            .map(|vector| (vector.level(), vector.values()));
        Self::build(threshold, levels, attenuation_db)
    }

    pub fn detector(&self) -> &str {
        &self.detector
    }

    pub fn gamma0(&self) -> f64 {
        self.gamma0
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Lowest input power at which Pd reaches `target_pd`.
    ///
    /// Returns 0 when the curve never reaches the target, and also when Pd
    /// is already above the target at the lowest swept power.
    pub fn pinmin(&self, target_pd: f64) -> f64 {
        let first = match self.points.first() {
            Some(first) => first,
            None => return 0.0,
        };
        if first.pd > target_pd {
            return 0.0;
        }
        let index = match self.points.iter().position(|p| p.pd >= target_pd) {
            Some(index) => index,
            None => return 0.0,
        };
        if index == 0 {
            return first.power;
        }
        let (below, above) = (self.points[index - 1], self.points[index]);
        below.power + (target_pd - below.pd) * (above.power - below.power) / (above.pd - below.pd)
    }
}

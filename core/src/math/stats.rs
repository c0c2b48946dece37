pub struct StatsHelper;

impl StatsHelper {
    /// Sum of squares.
    pub fn energy(samples: &[f64]) -> f64 {
        samples.iter().map(|&v| v * v).sum()
    }

    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Ascending copy, NaN ordered last.
    pub fn sorted(values: &[f64]) -> Vec<f64> {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted
    }

    /// Piecewise-linear interpolation of `(xp, fp)` at `x`.
    ///
    /// `xp` must be non-decreasing. Points outside `[xp[0], xp[last]]` map to
    /// `left` / `right`; an empty table yields NaN.
    pub fn interp(x: f64, xp: &[f64], fp: &[f64], left: f64, right: f64) -> f64 {
        let len = xp.len().min(fp.len());
        if len == 0 {
            return f64::NAN;
        }
        let (xp, fp) = (&xp[..len], &fp[..len]);
        if x < xp[0] {
            return left;
        }
        if x > xp[len - 1] {
            return right;
        }

        let upper = xp.partition_point(|&v| v <= x);
        if upper >= len {
            return fp[len - 1];
        }
        let (x0, x1) = (xp[upper - 1], xp[upper]);
        let (y0, y1) = (fp[upper - 1], fp[upper]);
        if x1 == x0 {
            y1
        } else {
            y0 + (x - x0) * (y1 - y0) / (x1 - x0)
        }
    }

    /// Fraction of values strictly greater than `threshold`.
    pub fn fraction_above(values: &[f64], threshold: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let count = values.iter().filter(|&&v| v > threshold).count();
        count as f64 / values.len() as f64
    }
}

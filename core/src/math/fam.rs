//! FFT Accumulation Method estimate of the spectral correlation function.
//!
//! The input is channelised into overlapping Hamming-windowed segments, each
//! segment is transformed and demodulated to baseband, and every pair of
//! channels is correlated across segments with a second FFT. The resulting
//! cyclic spectra are tiled into one surface indexed by centre frequency
//! (rows) and cyclic frequency (columns).

use crate::math::fft::FftHelper;
use crate::prelude::{SenseError, SenseResult};
use ndarray::Array2;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Estimator parameters: channel width `Np`, hop `L` and optional output length `N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamEstimator {
    channels: usize,
    hop: usize,
    total_len: Option<usize>,
}

/// Spectral correlation surface of shape `(Np, 2N)`.
#[derive(Debug, Clone)]
pub struct SpectralSurface {
    pub surface: Array2<Complex64>,
    /// `N = L * P`, the cyclic-frequency resolution of the surface.
    pub total_len: usize,
    /// Half width `Mp` of each tiled slice.
    pub half_width: usize,
    /// Number of segments `P` averaged by the second FFT.
    pub segments: usize,
}

impl SpectralSurface {
    /// Column holding the zero cyclic frequency.
    pub fn zero_alpha_column(&self) -> usize {
        self.total_len
    }

    /// Whether `column` lies outside the band tiled around zero cyclic frequency.
    pub fn is_off_diagonal(&self, column: usize) -> bool {
        let centre = self.zero_alpha_column();
        column + self.half_width < centre || column >= centre + self.half_width
    }
}

impl FamEstimator {
    pub fn new(channels: usize, hop: usize) -> SenseResult<Self> {
        if channels < 2 {
            return Err(SenseError::Precondition(format!(
                "FAM needs at least 2 channels, got {}",
                channels
            )));
        }
        if hop == 0 || hop > channels {
            return Err(SenseError::Precondition(format!(
                "FAM hop {} must be in 1..={}",
                hop, channels
            )));
        }
        Ok(Self {
            channels,
            hop,
            total_len: None,
        })
    }

    /// Fixes the output length `N`, forcing `P = N / L` segments.
    pub fn with_total_len(mut self, total_len: usize) -> Self {
        self.total_len = Some(total_len);
        self
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Fails when an input of `len` samples cannot produce a surface.
    pub fn check_len(&self, len: usize) -> SenseResult<()> {
        self.geometry(len).map(|_| ())
    }

    /// Segment count `P` and output length `N` for an input of `len` samples.
    fn geometry(&self, len: usize) -> SenseResult<(usize, usize)> {
        if len < self.channels {
            return Err(SenseError::Precondition(format!(
                "FAM input of {} samples is shorter than {} channels",
                len, self.channels
            )));
        }
        let available = (len - self.channels) / self.hop + 1;
        let (segments, total_len) = match self.total_len {
            None => {
                let segments = 1usize << available.ilog2();
                (segments, self.hop * segments)
            }
            Some(total_len) => {
                if total_len % self.hop != 0 {
                    return Err(SenseError::Precondition(format!(
                        "output length {} is not a multiple of hop {}",
                        total_len, self.hop
                    )));
                }
                let segments = total_len / self.hop;
                if segments == 0 || segments > available {
                    return Err(SenseError::Precondition(format!(
                        "output length {} needs {} segments, input provides {}",
                        total_len, segments, available
                    )));
                }
                (segments, total_len)
            }
        };

        if total_len / self.channels / 2 == 0 {
            return Err(SenseError::Precondition(format!(
                "input too short for cyclic resolution: N = {} with {} channels",
                total_len, self.channels
            )));
        }
        Ok((segments, total_len))
    }

    pub fn estimate(&self, samples: &[Complex64]) -> SenseResult<SpectralSurface> {
        let np = self.channels;
        let (segments, total_len) = self.geometry(samples.len())?;
        let half_width = total_len / np / 2;

        let window = normalized_hamming(np);
        let channel_fft = FftHelper::new(np);
        let mut demodulated = Array2::<Complex64>::zeros((segments, np));
        let mut buffer = vec![Complex64::new(0.0, 0.0); np];

        for segment in 0..segments {
            let start = segment * self.hop;
            for (slot, (sample, weight)) in buffer
                .iter_mut()
                .zip(samples[start..start + np].iter().zip(&window))
            {
                *slot = sample * weight;
            }
            channel_fft.forward_shifted(&mut buffer);

            let t = (segment * self.hop) as f64;
            for (k, value) in buffer.iter().enumerate() {
                let f = k as f64 / np as f64 - 0.5;
                demodulated[[segment, k]] = value * Complex64::from_polar(1.0, -2.0 * PI * f * t);
            }
        }

        let smoothing_fft = FftHelper::new(segments);
        let mut surface = Array2::<Complex64>::zeros((np, 2 * total_len));
        let mut product = vec![Complex64::new(0.0, 0.0); segments];
        let scale = segments as f64;
        let source_start = segments / 2 - half_width;

        for k in 0..np {
            for l in 0..np {
                for (segment, slot) in product.iter_mut().enumerate() {
                    *slot = demodulated[[segment, k]] * demodulated[[segment, l]].conj();
                }
                smoothing_fft.forward_shifted(&mut product);

                let row = (k + l) / 2;
                let centre = (k + np - l) * total_len / np;
                let target_start = centre - half_width;
                for offset in 0..2 * half_width {
                    surface[[row, target_start + offset]] = product[source_start + offset] / scale;
                }
            }
        }

        Ok(SpectralSurface {
            surface,
            total_len,
            half_width,
            segments,
        })
    }
}

/// Hamming window scaled to unit energy.
fn normalized_hamming(len: usize) -> Vec<f64> {
    let window: Vec<f64> = if len == 1 {
        vec![1.0]
    } else {
        (0..len)
            .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f64 / (len - 1) as f64).cos())
            .collect()
    };
    let norm = window.iter().map(|w| w * w).sum::<f64>().sqrt();
    window.into_iter().map(|w| w / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, cycles_per_sample: f64) -> Vec<Complex64> {
        (0..len)
            .map(|n| Complex64::new((2.0 * PI * cycles_per_sample * n as f64).cos(), 0.0))
            .collect()
    }

    #[test]
    fn hamming_window_has_unit_energy() {
        let w = normalized_hamming(16);
        let energy: f64 = w.iter().map(|v| v * v).sum();
        assert!((energy - 1.0).abs() < 1e-12);
        assert!((w[0] - w[15]).abs() < 1e-12);
    }

    #[test]
    fn surface_has_expected_shape() {
        let estimator = FamEstimator::new(8, 2).unwrap();
        // (256 - 8) / 2 + 1 = 125 segments -> P = 64, N = 128, Mp = 8
        let result = estimator.estimate(&tone(256, 0.1)).unwrap();
        assert_eq!(result.segments, 64);
        assert_eq!(result.total_len, 128);
        assert_eq!(result.half_width, 8);
        assert_eq!(result.surface.dim(), (8, 256));
    }

    #[test]
    fn explicit_total_length_fixes_segments() {
        let estimator = FamEstimator::new(8, 2).unwrap().with_total_len(64);
        let result = estimator.estimate(&tone(256, 0.1)).unwrap();
        assert_eq!(result.segments, 32);
        assert_eq!(result.surface.dim(), (8, 128));
    }

    #[test]
    fn zero_alpha_slice_carries_power_spectrum() {
        let estimator = FamEstimator::new(8, 2).unwrap();
        let result = estimator.estimate(&tone(256, 0.125)).unwrap();
        let column = result.zero_alpha_column();
        let psd: Vec<f64> = (0..8).map(|row| result.surface[[row, column]].norm()).collect();
        // the k == l products land on the zero cyclic frequency and are real-valued powers
        assert!(psd.iter().all(|p| p.is_finite()));
        assert!(psd.iter().any(|&p| p > 0.0));
        for row in 0..8 {
            assert!(result.surface[[row, column]].im.abs() < 1e-9);
        }
    }

    #[test]
    fn short_input_is_a_precondition_violation() {
        let estimator = FamEstimator::new(32, 4).unwrap();
        assert!(matches!(
            estimator.estimate(&tone(16, 0.1)),
            Err(SenseError::Precondition(_))
        ));
        assert!(FamEstimator::new(8, 9).is_err());
        assert!(FamEstimator::new(1, 1).is_err());
    }
}

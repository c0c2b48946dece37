use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps a planned forward `rustfft` transform for reuse.
pub struct FftHelper {
    fft: Arc<dyn Fft<f64>>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        Self { fft, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// In-place forward transform; `buffer` must hold exactly `size` values.
    pub fn forward(&self, buffer: &mut [Complex64]) {
        debug_assert_eq!(buffer.len(), self.size);
        self.fft.process(buffer);
    }

    /// Forward transform followed by [`fftshift`].
    pub fn forward_shifted(&self, buffer: &mut [Complex64]) {
        self.forward(buffer);
        fftshift(buffer);
    }
}

/// Moves the zero-frequency bin to the centre (`n / 2`).
pub fn fftshift<T>(data: &mut [T]) {
    let half = data.len() / 2;
    data.rotate_right(half);
}

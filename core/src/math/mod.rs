pub mod fam;
pub mod fft;
pub mod matrix;
pub mod stats;

pub use fam::{FamEstimator, SpectralSurface};
pub use fft::{fftshift, FftHelper};
pub use matrix::MatrixHelper;
pub use stats::StatsHelper;

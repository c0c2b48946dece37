use num_complex::Complex32;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use sensecore::prelude::value_token;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Linear power (mean square, 0 dBm = 1.0) of a level in dBm.
pub fn dbm_to_power(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

fn default_deviation() -> f64 {
    15_000.0
}

fn default_modulating_tone() -> f64 {
    3_900.0
}

fn default_period() -> f64 {
    1e-3
}

/// Modulation applied by the synthetic signal generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Waveform {
    /// Unmodulated carrier.
    Tone,
    /// Wireless microphone model: FM by a single audio tone.
    FmMicrophone {
        #[serde(default = "default_deviation")]
        deviation_hz: f64,
        #[serde(default = "default_modulating_tone")]
        tone_hz: f64,
    },
    /// Complex Gaussian noise.
    Noise,
    /// Carrier keyed on for `duty` of every period.
    DutyCycle {
        duty: f64,
        #[serde(default = "default_period")]
        period_s: f64,
    },
}

impl Waveform {
    pub fn microphone() -> Self {
        Waveform::FmMicrophone {
            deviation_hz: default_deviation(),
            tone_hz: default_modulating_tone(),
        }
    }

    pub fn duty_cycle(duty: f64) -> Self {
        Waveform::DutyCycle {
            duty,
            period_s: default_period(),
        }
    }

    pub fn slug(&self) -> String {
        match self {
            Waveform::Tone => "tone".to_string(),
            Waveform::FmMicrophone { .. } => "micsoft".to_string(),
            Waveform::Noise => "noise".to_string(),
            Waveform::DutyCycle { duty, .. } => format!("cw_dc{}", (duty * 100.0).round() as u32),
        }
    }

    /// Adds the waveform at `power` to `out`, `offset_hz` away from the
    /// receiver carrier. `start` is the absolute index of `out[0]`, so
    /// consecutive calls stay phase-continuous.
    pub fn render(
        &self,
        out: &mut [Complex32],
        power: f64,
        offset_hz: f64,
        sample_rate_hz: f64,
        start: u64,
        rng: &mut StdRng,
    ) {
        let amplitude = power.sqrt();
        let time = |n: usize| (start + n as u64) as f64 / sample_rate_hz;

        match self {
            Waveform::Tone => {
                for (n, sample) in out.iter_mut().enumerate() {
                    *sample += carrier(amplitude, 2.0 * PI * offset_hz * time(n));
                }
            }
            Waveform::FmMicrophone {
                deviation_hz,
                tone_hz,
            } => {
                let index = deviation_hz / tone_hz;
                for (n, sample) in out.iter_mut().enumerate() {
                    let t = time(n);
                    let phase = 2.0 * PI * offset_hz * t + index * (2.0 * PI * tone_hz * t).sin();
                    *sample += carrier(amplitude, phase);
                }
            }
            Waveform::Noise => {
                let sigma = (power / 2.0).sqrt();
                if let Ok(normal) = Normal::new(0.0, sigma) {
                    for sample in out.iter_mut() {
                        *sample += Complex32::new(
                            normal.sample(rng) as f32,
                            normal.sample(rng) as f32,
                        );
                    }
                }
            }
            Waveform::DutyCycle { duty, period_s } => {
                for (n, sample) in out.iter_mut().enumerate() {
                    let t = time(n);
                    if (t / period_s).fract() < *duty {
                        *sample += carrier(amplitude, 2.0 * PI * offset_hz * t);
                    }
                }
            }
        }
    }
}

fn carrier(amplitude: f64, phase: f64) -> Complex32 {
    Complex32::new(
        (amplitude * phase.cos()) as f32,
        (amplitude * phase.sin()) as f32,
    )
}

/// Interfering tone present regardless of the generator state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spurious {
    pub offset_hz: f64,
    /// Power at the receiver input.
    pub dbm: f64,
}

impl Spurious {
    pub fn slug(&self) -> String {
        format!(
            "spur{}khz_{}dbm",
            value_token(self.offset_hz / 1e3),
            value_token(self.dbm)
        )
    }
}

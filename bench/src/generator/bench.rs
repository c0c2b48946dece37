use crate::generator::waveform::{dbm_to_power, Spurious, Waveform};
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use sensecore::interface::{ChunkDevice, ChunkStream, SampleSource, StimulusSource};
use sensecore::prelude::{SamplingConfig, SenseError, SenseResult, StimulusLevel};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

fn default_noise_floor() -> f64 {
    -100.0
}

fn default_path_loss() -> f64 {
    30.0
}

/// Parameters of the simulated generator/receiver pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub waveform: Waveform,
    #[serde(default)]
    pub spurious: Option<Spurious>,
    /// Receiver noise power over the full sampled bandwidth.
    #[serde(default = "default_noise_floor")]
    pub noise_floor_dbm: f64,
    /// Loss between generator output and receiver input.
    #[serde(default = "default_path_loss")]
    pub path_loss_db: f64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub warmup_samples: usize,
    /// When set, the receiver is driven as a chunk stream of this size.
    #[serde(default)]
    pub chunk_len: Option<usize>,
}

impl SyntheticConfig {
    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            spurious: None,
            noise_floor_dbm: default_noise_floor(),
            path_loss_db: default_path_loss(),
            seed: 0,
            warmup_samples: 0,
            chunk_len: None,
        }
    }

    pub fn generator_slug(&self) -> String {
        match &self.spurious {
            Some(spurious) => format!("{}_{}", self.waveform.slug(), spurious.slug()),
            None => self.waveform.slug(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct StimulusState {
    frequency_hz: f64,
    level: StimulusLevel,
    enabled: bool,
}

type SharedStimulus = Arc<Mutex<StimulusState>>;

fn read_state(state: &SharedStimulus) -> SenseResult<StimulusState> {
    state
        .lock()
        .map(|guard| *guard)
        .map_err(|_| SenseError::Internal("stimulus state poisoned".into()))
}

/// Generator half of the synthetic bench.
pub struct SyntheticStimulus {
    state: SharedStimulus,
    slug: String,
}

impl StimulusSource for SyntheticStimulus {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn set(&mut self, frequency_hz: f64, level: &StimulusLevel) -> SenseResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SenseError::Internal("stimulus state poisoned".into()))?;
        *state = StimulusState {
            frequency_hz,
            level: *level,
            enabled: !level.is_off(),
        };
        Ok(())
    }

    fn off(&mut self) -> SenseResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SenseError::Internal("stimulus state poisoned".into()))?;
        state.enabled = false;
        Ok(())
    }
}

/// Receiver half: thermal noise plus whatever the paired generator emits.
pub struct SyntheticReceiver {
    config: SyntheticConfig,
    state: SharedStimulus,
    rng: StdRng,
    clock: u64,
}

impl SyntheticReceiver {
    fn synthesize(&mut self, sampling: &SamplingConfig, len: usize) -> SenseResult<Vec<Complex32>> {
        let sigma = (dbm_to_power(self.config.noise_floor_dbm) / 2.0).sqrt();
        let normal = Normal::new(0.0, sigma)
            .map_err(|err| SenseError::Precondition(format!("noise floor: {}", err)))?;
        let mut samples: Vec<Complex32> = (0..len)
            .map(|_| {
                Complex32::new(
                    normal.sample(&mut self.rng) as f32,
                    normal.sample(&mut self.rng) as f32,
                )
            })
            .collect();

        let stimulus = read_state(&self.state)?;
        if let (true, Some(dbm)) = (stimulus.enabled, stimulus.level.dbm()) {
            self.config.waveform.render(
                &mut samples,
                dbm_to_power(dbm - self.config.path_loss_db),
                stimulus.frequency_hz - sampling.carrier_hz,
                sampling.sample_rate_hz,
                self.clock,
                &mut self.rng,
            );
        }
        if let Some(spurious) = self.config.spurious {
            Waveform::Tone.render(
                &mut samples,
                dbm_to_power(spurious.dbm),
                spurious.offset_hz,
                sampling.sample_rate_hz,
                self.clock,
                &mut self.rng,
            );
        }

        self.clock += len as u64;
        Ok(samples)
    }
}

impl SampleSource for SyntheticReceiver {
    fn slug(&self) -> &str {
        "sim"
    }

    fn warm_up(&mut self) -> SenseResult<()> {
        if self.config.warmup_samples == 0 {
            return Ok(());
        }
        let sampling = SamplingConfig {
            carrier_hz: 0.0,
            sample_rate_hz: 1.0,
            window_len: 1,
            window_count: 1,
            extra: 0,
            stimulus_offset_hz: 0.0,
        };
        log::info!(
            "[sim] warming up with {} discarded samples",
            self.config.warmup_samples
        );
        self.synthesize(&sampling, self.config.warmup_samples)?;
        Ok(())
    }

    fn capture(&mut self, config: &SamplingConfig) -> SenseResult<Vec<Complex32>> {
        self.synthesize(config, config.total_samples())
    }
}

/// The synthetic receiver seen as a device that delivers fixed-size chunks.
pub struct SyntheticDevice {
    receiver: SyntheticReceiver,
    chunk_len: usize,
}

impl ChunkDevice for SyntheticDevice {
    fn slug(&self) -> &str {
        "simstream"
    }

    fn warm_up(&mut self) -> SenseResult<()> {
        self.receiver.warm_up()
    }

    fn stream(&mut self, config: &SamplingConfig) -> SenseResult<ChunkStream<'_>> {
        let config = config.clone();
        let chunk_len = self.chunk_len;
        let receiver = &mut self.receiver;
        Ok(Box::new(std::iter::from_fn(move || {
            Some(receiver.synthesize(&config, chunk_len))
        })))
    }
}

/// Builds the linked generator/receiver pair.
pub fn synthetic_bench(config: &SyntheticConfig) -> (SyntheticReceiver, SyntheticStimulus) {
    let state = Arc::new(Mutex::new(StimulusState {
        frequency_hz: 0.0,
        level: StimulusLevel::Off,
        enabled: false,
    }));
    let receiver = SyntheticReceiver {
        config: config.clone(),
        state: Arc::clone(&state),
        rng: StdRng::seed_from_u64(config.seed),
        clock: 0,
    };
    let stimulus = SyntheticStimulus {
        state,
        slug: config.generator_slug(),
    };
    (receiver, stimulus)
}

/// Same pair, with the receiver wrapped as a chunk device.
pub fn synthetic_stream_bench(
    config: &SyntheticConfig,
    chunk_len: usize,
) -> SenseResult<(SyntheticDevice, SyntheticStimulus)> {
    if chunk_len == 0 {
        return Err(SenseError::Precondition("chunk length must be positive".into()));
    }
    let (receiver, stimulus) = synthetic_bench(config);
    Ok((
        SyntheticDevice {
            receiver,
            chunk_len,
        },
        stimulus,
    ))
}

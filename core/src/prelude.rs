use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Sampling parameters shared by every stage of a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub carrier_hz: f64,
    pub sample_rate_hz: f64,
    pub window_len: usize,
    pub window_count: usize,
    /// Leading samples captured for receiver settling and discarded before windowing.
    #[serde(default)]
    pub extra: usize,
    /// Offset of the stimulus carrier relative to the receiver carrier.
    #[serde(default)]
    pub stimulus_offset_hz: f64,
}

impl SamplingConfig {
    /// Number of samples one capture must deliver.
    pub fn total_samples(&self) -> usize {
        self.window_len * self.window_count + self.extra
    }

    pub fn validate(&self) -> SenseResult<()> {
        if self.window_len == 0 {
            return Err(SenseError::Precondition("window length must be positive".into()));
        }
        if self.window_count == 0 {
            return Err(SenseError::Precondition("window count must be positive".into()));
        }
        let invalid = |value: f64| value.is_nan() || value < 0.0;
        if invalid(self.sample_rate_hz) || invalid(self.carrier_hz) {
            return Err(SenseError::Precondition(format!(
                "invalid carrier {} Hz / sample rate {} Hz",
                self.carrier_hz, self.sample_rate_hz
            )));
        }
        Ok(())
    }
}

/// Stimulus applied by the generator while one block is captured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StimulusLevel {
    /// Generator output disabled; defines the noise-only reference.
    Off,
    Power { dbm: f64 },
    /// Fixed power at a carrier offset, used by frequency-sweep campaigns.
    FrequencyOffset { offset_hz: f64, dbm: f64 },
}

impl StimulusLevel {
    pub fn is_off(&self) -> bool {
        matches!(self, StimulusLevel::Off)
    }

    pub fn dbm(&self) -> Option<f64> {
        match self {
            StimulusLevel::Off => None,
            StimulusLevel::Power { dbm } | StimulusLevel::FrequencyOffset { dbm, .. } => Some(*dbm),
        }
    }

    pub fn offset_hz(&self) -> f64 {
        match self {
            StimulusLevel::FrequencyOffset { offset_hz, .. } => *offset_hz,
            _ => 0.0,
        }
    }

    /// Receiver input power quantity the level is plotted against.
    ///
    /// Power sweeps subtract the fixed path attenuation, frequency sweeps use
    /// the absolute offset. `Off` has no input power.
    pub fn receiver_power(&self, attenuation_db: f64) -> Option<f64> {
        match self {
            StimulusLevel::Off => None,
            StimulusLevel::Power { dbm } => Some(dbm - attenuation_db),
            StimulusLevel::FrequencyOffset { offset_hz, .. } => Some(offset_hz.abs()),
        }
    }

    /// File-name token, e.g. `off`, `m70_0dbm` or `m60_0dbm_250_0khz`.
    pub fn token(&self) -> String {
        match self {
            StimulusLevel::Off => "off".to_string(),
            StimulusLevel::Power { dbm } => format!("{}dbm", value_token(*dbm)),
            StimulusLevel::FrequencyOffset { offset_hz, dbm } => format!(
                "{}dbm_{}khz",
                value_token(*dbm),
                value_token(offset_hz / 1e3)
            ),
        }
    }

    /// Inverse of [`StimulusLevel::token`]; `None` when the token is not a level.
    pub fn parse_token(token: &str) -> Option<Self> {
        if token == "off" {
            return Some(StimulusLevel::Off);
        }
        if let Some(body) = token.strip_suffix("khz") {
            let (dbm, offset) = body.rsplit_once("dbm_")?;
            return Some(StimulusLevel::FrequencyOffset {
                offset_hz: parse_value_token(offset)? * 1e3,
                dbm: parse_value_token(dbm)?,
            });
        }
        let dbm = parse_value_token(token.strip_suffix("dbm")?)?;
        Some(StimulusLevel::Power { dbm })
    }
}

impl fmt::Display for StimulusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StimulusLevel::Off => write!(f, "off"),
            StimulusLevel::Power { dbm } => write!(f, "{:.1} dBm", dbm),
            StimulusLevel::FrequencyOffset { offset_hz, dbm } => {
                write!(f, "{:.1} dBm @ {:+.1} kHz", dbm, offset_hz / 1e3)
            }
        }
    }
}

/// Formats a value with one decimal, `-` as `m` and `.` as `_`.
pub fn value_token(value: f64) -> String {
    format!("{:.1}", value).replace('-', "m").replace('.', "_")
}

pub fn parse_value_token(token: &str) -> Option<f64> {
    let (sign, body) = match token.strip_prefix('m') {
        Some(rest) => (-1.0, rest),
        None => (1.0, token),
    };
    if !body.starts_with(|c: char| c.is_ascii_digit())
        || !body.chars().all(|c| c.is_ascii_digit() || c == '_')
    {
        return None;
    }
    body.replace('_', ".").parse::<f64>().ok().map(|v| sign * v)
}

/// Raw capture for one stimulus level, including the leading settling samples.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    samples: Vec<Complex32>,
    level: StimulusLevel,
    sampling: SamplingConfig,
}

impl SampleBlock {
    pub fn new(samples: Vec<Complex32>, level: StimulusLevel, sampling: SamplingConfig) -> Self {
        Self {
            samples,
            level,
            sampling,
        }
    }

    pub fn samples(&self) -> &[Complex32] {
        &self.samples
    }

    pub fn level(&self) -> StimulusLevel {
        self.level
    }

    pub fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }

    /// Samples after the settling prefix.
    pub fn payload(&self) -> &[Complex32] {
        let skip = self.sampling.extra.min(self.samples.len());
        &self.samples[skip..]
    }

    /// Number of complete windows; a trailing partial window is not counted.
    pub fn window_count(&self) -> usize {
        self.payload().len() / self.sampling.window_len.max(1)
    }

    /// Real parts of each complete window, in capture order.
    pub fn real_windows(&self) -> impl Iterator<Item = Vec<f64>> + '_ {
        self.payload()
            .chunks_exact(self.sampling.window_len.max(1))
            .map(|window| window.iter().map(|s| s.re as f64).collect())
    }
}

/// Per-window statistics of one detector at one stimulus level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticVector {
    detector: String,
    level: StimulusLevel,
    sampling: SamplingConfig,
    values: Vec<f64>,
}

impl StatisticVector {
    pub fn new(detector: impl Into<String>, level: StimulusLevel, sampling: SamplingConfig) -> Self {
        Self {
            detector: detector.into(),
            level,
            sampling,
            values: Vec::new(),
        }
    }

    pub fn with_values(
        detector: impl Into<String>,
        level: StimulusLevel,
        sampling: SamplingConfig,
        values: Vec<f64>,
    ) -> Self {
        Self {
            detector: detector.into(),
            level,
            sampling,
            values,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    pub fn detector(&self) -> &str {
        &self.detector
    }

    pub fn level(&self) -> StimulusLevel {
        self.level
    }

    pub fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Error taxonomy shared by the library.
#[derive(thiserror::Error, Debug)]
pub enum SenseError {
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error("refusing to overwrite existing output {}", .0.display())]
    OutputCollision(PathBuf),
    #[error("pipeline channel closed: {0}")]
    ChannelClosed(String),
    #[error("malformed data: {0}")]
    Parse(String),
    #[error("internal failure: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type SenseResult<T> = Result<T, SenseError>;

/// Lifecycle shared by the acquisition and detection stages.
pub trait PipelineStage {
    type Input;
    type Output;

    fn initialize(&mut self, config: &SamplingConfig) -> SenseResult<()>;
    fn execute(&mut self, input: Self::Input) -> SenseResult<Self::Output>;
    fn cleanup(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampling(window_len: usize, window_count: usize, extra: usize) -> SamplingConfig {
        SamplingConfig {
            carrier_hz: 864e6,
            sample_rate_hz: 1e6,
            window_len,
            window_count,
            extra,
            stimulus_offset_hz: 0.0,
        }
    }

    #[test]
    fn level_tokens_round_trip() {
        let levels = [
            StimulusLevel::Off,
            StimulusLevel::Power { dbm: -70.0 },
            StimulusLevel::Power { dbm: -92.5 },
            StimulusLevel::Power { dbm: 3.0 },
            StimulusLevel::FrequencyOffset {
                offset_hz: -250e3,
                dbm: -60.0,
            },
        ];
        for level in levels {
            assert_eq!(StimulusLevel::parse_token(&level.token()), Some(level));
        }
        assert_eq!(StimulusLevel::Power { dbm: -70.0 }.token(), "m70_0dbm");
    }

    #[test]
    fn malformed_level_tokens_are_rejected() {
        assert_eq!(StimulusLevel::parse_token("l10_m70_0dbm"), None);
        assert_eq!(StimulusLevel::parse_token("dbm"), None);
        assert_eq!(StimulusLevel::parse_token("m_dbm"), None);
        assert_eq!(StimulusLevel::parse_token("summary"), None);
    }

    #[test]
    fn receiver_power_applies_attenuation() {
        let level = StimulusLevel::Power { dbm: -70.0 };
        assert_eq!(level.receiver_power(30.0), Some(-100.0));
        assert_eq!(StimulusLevel::Off.receiver_power(30.0), None);
        let offset = StimulusLevel::FrequencyOffset {
            offset_hz: -5e3,
            dbm: -60.0,
        };
        assert_eq!(offset.receiver_power(30.0), Some(5e3));
    }

    #[test]
    fn block_drops_extra_and_partial_window() {
        let samples: Vec<Complex32> = (0..23).map(|i| Complex32::new(i as f32, 0.0)).collect();
        let block = SampleBlock::new(samples, StimulusLevel::Off, sampling(5, 4, 2));

        assert_eq!(block.payload().len(), 21);
        assert_eq!(block.window_count(), 4);
        let windows: Vec<Vec<f64>> = block.real_windows().collect();
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0], vec![2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(windows[3][4], 21.0);
    }

    #[test]
    fn sampling_validation_rejects_empty_windows() {
        assert!(sampling(0, 4, 0).validate().is_err());
        assert!(sampling(8, 0, 0).validate().is_err());
        assert_eq!(sampling(8, 4, 3).total_samples(), 35);
    }
}

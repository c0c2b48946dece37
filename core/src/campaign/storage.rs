use crate::prelude::{
    value_token, SamplingConfig, SenseError, SenseResult, StatisticVector, StimulusLevel,
};
use num_complex::Complex32;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// File naming for one campaign run.
///
/// Statistic files are `{prefix}_{detector}_{level}.dat`, where the prefix
/// encodes source, generator, sample rate and window length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    dir: PathBuf,
    prefix: String,
}

impl OutputLayout {
    pub fn new(
        dir: impl Into<PathBuf>,
        source: &str,
        generator: &str,
        sampling: &SamplingConfig,
    ) -> Self {
        let prefix = format!(
            "{}_{}_fs{}mhz_ns{}",
            source,
            generator,
            value_token(sampling.sample_rate_hz / 1e6),
            sampling.window_len
        );
        Self {
            dir: dir.into(),
            prefix,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn statistic_path(&self, detector: &str, level: &StimulusLevel) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.dat", self.prefix, detector, level.token()))
    }

    pub fn raw_path(&self, level: &StimulusLevel) -> PathBuf {
        self.dir
            .join(format!("{}_raw_{}.cf32", self.prefix, level.token()))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(format!("{}_summary.json", self.prefix))
    }

    /// Every path a run over `detectors` x `levels` would create.
    pub fn planned_paths(
        &self,
        detectors: &[String],
        levels: &[StimulusLevel],
        keep_raw: bool,
    ) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for level in levels {
            for detector in detectors {
                paths.push(self.statistic_path(detector, level));
            }
            if keep_raw {
                paths.push(self.raw_path(level));
            }
        }
        paths.push(self.summary_path());
        paths
    }

    /// Creates the output directory and refuses to run over existing results.
    pub fn prepare(&self, planned: &[PathBuf]) -> SenseResult<()> {
        fs::create_dir_all(&self.dir)?;
        match planned.iter().find(|path| path.exists()) {
            Some(existing) => Err(SenseError::OutputCollision(existing.clone())),
            None => Ok(()),
        }
    }
}

/// Opens `path` for writing, failing if anything is already there.
pub fn create_new(path: &Path) -> SenseResult<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => SenseError::OutputCollision(path.to_path_buf()),
            _ => SenseError::Io(err),
        })
}

/// Writes one value per line in scientific notation.
pub fn write_statistics(path: &Path, vector: &StatisticVector) -> SenseResult<()> {
    let mut writer = BufWriter::new(create_new(path)?);
    for value in vector.values() {
        writeln!(writer, "{:e}", value)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_statistics(path: &Path) -> SenseResult<Vec<f64>> {
    let reader = BufReader::new(File::open(path)?);
    let mut values = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value = trimmed.parse::<f64>().map_err(|err| {
            SenseError::Parse(format!("{}:{}: {}", path.display(), number + 1, err))
        })?;
        values.push(value);
    }
    Ok(values)
}

/// Interleaved little-endian `f32` I/Q pairs.
pub fn write_block(path: &Path, samples: &[Complex32]) -> SenseResult<()> {
    let mut writer = BufWriter::new(create_new(path)?);
    for sample in samples {
        writer.write_all(&sample.re.to_le_bytes())?;
        writer.write_all(&sample.im.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_block(path: &Path) -> SenseResult<Vec<Complex32>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    decode_block(&bytes).ok_or_else(|| {
        SenseError::Parse(format!(
            "{}: {} bytes is not a whole number of complex samples",
            path.display(),
            bytes.len()
        ))
    })
}

/// Decodes interleaved little-endian `f32` pairs; `None` on a ragged tail.
pub fn decode_block(bytes: &[u8]) -> Option<Vec<Complex32>> {
    if bytes.len() % 8 != 0 {
        return None;
    }
    let samples = bytes
        .chunks_exact(8)
        .map(|pair| {
            let re = f32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
            let im = f32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
            Complex32::new(re, im)
        })
        .collect();
    Some(samples)
}

use num_complex::Complex32;
use sensecore::campaign::storage::read_block;
use sensecore::interface::SampleSource;
use sensecore::prelude::{SamplingConfig, SenseError, SenseResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;

fn default_program() -> String {
    "uhd_rx_cfile".into()
}

fn default_args() -> Vec<String> {
    [
        "-v",
        "--freq={freq}",
        "--nsamples={nsamples}",
        "--samp-rate={rate}",
        "-ATX/RX",
        "{path}",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

fn default_slug() -> String {
    "usrp".into()
}

/// External recorder writing interleaved complex `f32` samples to a file.
///
/// Argument templates may use `{freq}`, `{nsamples}`, `{rate}` and `{path}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureToolConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_slug")]
    pub slug: String,
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for CaptureToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            slug: default_slug(),
            temp_dir: None,
        }
    }
}

pub struct CaptureTool {
    config: CaptureToolConfig,
}

impl CaptureTool {
    pub fn new(config: CaptureToolConfig) -> Self {
        Self { config }
    }

    fn expand(&self, sampling: &SamplingConfig, path: &str) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{freq}", &format!("{:.0}", sampling.carrier_hz))
                    .replace("{nsamples}", &sampling.total_samples().to_string())
                    .replace("{rate}", &format!("{:.6}", sampling.sample_rate_hz))
                    .replace("{path}", path)
            })
            .collect()
    }
}

impl SampleSource for CaptureTool {
    fn slug(&self) -> &str {
        &self.config.slug
    }

    fn capture(&mut self, config: &SamplingConfig) -> SenseResult<Vec<Complex32>> {
        // removed when dropped, whatever the outcome
        let file = match &self.config.temp_dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        let path = file.path().to_string_lossy().into_owned();
        let args = self.expand(config, &path);

        log::info!(
            "[capture] recording {} samples at {:.0} Hz",
            config.total_samples(),
            config.carrier_hz
        );
        log::debug!("[capture] {} {}", self.config.program, args.join(" "));

        let status = Command::new(&self.config.program)
            .args(&args)
            .status()
            .map_err(|err| {
                SenseError::Capture(format!("cannot start {}: {}", self.config.program, err))
            })?;
        if !status.success() {
            return Err(SenseError::Capture(format!(
                "{} exited with {}",
                self.config.program, status
            )));
        }

        read_block(file.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensecore::campaign::storage::write_block;
    use tempfile::tempdir;

    fn sampling() -> SamplingConfig {
        SamplingConfig {
            carrier_hz: 864e6,
            sample_rate_hz: 2e6,
            window_len: 2,
            window_count: 1,
            extra: 1,
            stimulus_offset_hz: 0.0,
        }
    }

    #[test]
    fn default_arguments_match_recorder_invocation() {
        let tool = CaptureTool::new(CaptureToolConfig::default());
        assert_eq!(
            tool.expand(&sampling(), "/tmp/x"),
            vec![
                "-v",
                "--freq=864000000",
                "--nsamples=3",
                "--samp-rate=2000000.000000",
                "-ATX/RX",
                "/tmp/x"
            ]
        );
    }

    #[test]
    fn recorded_file_is_read_back() {
        let dir = tempdir().unwrap();
        let fixture = dir.path().join("fixture.cf32");
        let samples = vec![
            Complex32::new(0.25, -0.5),
            Complex32::new(1.0, 0.0),
            Complex32::new(-2.0, 3.0),
        ];
        write_block(&fixture, &samples).unwrap();

        let mut tool = CaptureTool::new(CaptureToolConfig {
            program: "cp".into(),
            args: vec![fixture.to_string_lossy().into_owned(), "{path}".into()],
            slug: "file".into(),
            temp_dir: Some(dir.path().to_path_buf()),
        });
        assert_eq!(tool.capture(&sampling()).unwrap(), samples);
        // only the fixture is left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn failing_recorder_is_a_capture_error() {
        let mut tool = CaptureTool::new(CaptureToolConfig {
            program: "false".into(),
            args: Vec::new(),
            ..CaptureToolConfig::default()
        });
        assert!(matches!(
            tool.capture(&sampling()),
            Err(SenseError::Capture(_))
        ));
    }
}

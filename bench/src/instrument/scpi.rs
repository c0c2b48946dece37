use sensecore::interface::StimulusSource;
use sensecore::prelude::{SenseResult, StimulusLevel};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

fn default_device() -> PathBuf {
    PathBuf::from("/dev/usbtmc3")
}

/// Signal generator reachable through a USBTMC-style device file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScpiConfig {
    #[serde(default = "default_device")]
    pub device: PathBuf,
    /// Name of the configured waveform, used in output paths.
    pub slug: String,
    /// Commands sent once after the preset.
    #[serde(default)]
    pub setup: Vec<String>,
}

impl ScpiConfig {
    /// FM wireless-microphone emulation using the internal LF generator.
    pub fn microphone() -> Self {
        Self {
            device: default_device(),
            slug: "micsoft".into(),
            setup: vec![
                "fm:dev 15000 Hz".into(),
                "fm:source int".into(),
                "lfo:freq 3900 Hz".into(),
                "fm:state on".into(),
            ],
        }
    }

    /// Generator playing a waveform already loaded on the instrument.
    pub fn preloaded(slug: &str) -> Self {
        Self {
            device: default_device(),
            slug: slug.into(),
            setup: Vec::new(),
        }
    }
}

pub struct ScpiGenerator<W> {
    link: W,
    slug: String,
}

impl ScpiGenerator<File> {
    pub fn open(config: &ScpiConfig) -> SenseResult<Self> {
        let link = OpenOptions::new().write(true).open(&config.device)?;
        Self::with_link(link, config)
    }
}

impl<W: Write + Send> ScpiGenerator<W> {
    /// Presets the instrument and applies the configured setup commands.
    pub fn with_link(link: W, config: &ScpiConfig) -> SenseResult<Self> {
        let mut generator = Self {
            link,
            slug: config.slug.clone(),
        };
        generator.command("system:preset")?;
        for command in &config.setup {
            generator.command(command)?;
        }
        Ok(generator)
    }

    fn command(&mut self, command: &str) -> SenseResult<()> {
        log::debug!("[scpi] {}", command);
        self.link.write_all(command.as_bytes())?;
        self.link.write_all(b"\n")?;
        self.link.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn into_link(self) -> W {
        self.link
    }
}

impl<W: Write + Send> StimulusSource for ScpiGenerator<W> {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn set(&mut self, frequency_hz: f64, level: &StimulusLevel) -> SenseResult<()> {
        self.command(&format!("freq {:.0} Hz", frequency_hz))?;
        match level.dbm() {
            None => self.command("outp off"),
            Some(dbm) => {
                self.command(&format!("pow {:.1} dBm", dbm))?;
                self.command("outp on")
            }
        }
    }

    fn off(&mut self) -> SenseResult<()> {
        self.command("outp off")
    }
}

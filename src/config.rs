//! Conversion settings, loadable from a TOML file
//!
//! ```toml
//! instrument = "strings"
//!
//! [extractor]
//! window_size = 2048
//! hop_size = 1024
//!
//! [quantizer]
//! bpm = 100.0
//! scale = "minor:a"
//!
//! [synth]
//! sample_rate = 44100
//!
//! [[instruments]]
//! name = "organ"
//! timbre = { kind = "additive", partials = [{ ratio = 1.0, amplitude = 1.0 }] }
//! ```
//!
//! Every field is optional; an empty file gives the defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::ExtractorConfig;
use crate::error::Result;
use crate::instrument::{Instrument, InstrumentProfile, InstrumentRegistry};
use crate::pipeline::{QuantizerConfig, SynthConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Name of a built-in instrument or of one of `instruments`
    pub instrument: String,
    pub extractor: ExtractorConfig,
    pub quantizer: QuantizerConfig,
    pub synth: SynthConfig,
    /// User-defined instrument profiles
    pub instruments: Vec<InstrumentProfile>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            instrument: Instrument::Piano.name().to_string(),
            extractor: ExtractorConfig::default(),
            quantizer: QuantizerConfig::default(),
            synth: SynthConfig::default(),
            instruments: Vec::new(),
        }
    }
}

impl ConversionConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check every section and that the instrument resolves
    pub fn validate(&self) -> Result<()> {
        self.extractor.validate()?;
        self.quantizer.validate()?;
        self.synth.validate()?;
        InstrumentRegistry::with_profiles(&self.instruments)?.resolve(&self.instrument)?;
        Ok(())
    }

    /// Registry of built-in and user-defined instruments
    pub fn registry(&self) -> Result<InstrumentRegistry> {
        InstrumentRegistry::with_profiles(&self.instruments)
    }
}

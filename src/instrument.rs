//! Instrument profiles: the timbre and envelope used to render notes
//!
//! Three instruments are built in. Additional profiles can be supplied in the
//! configuration file and are looked up by name alongside the built-in set.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::generator::adsr::{AdsrGenerator, EnvelopeSpec};
use crate::generator::additive::{AdditiveGenerator, Partial, Vibrato};
use crate::generator::fm_synth::{FmSynthGenerator, FmSynthParams};
use crate::generator::SignalGenerator;

/// Timbre model of an instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Timbre {
    /// Sum of (optionally decaying) sine partials
    Additive {
        partials: Vec<Partial>,
        #[serde(default)]
        vibrato: Option<Vibrato>,
    },
    /// Frequency modulation with its own modulation envelope
    Fm {
        harmonics: Vec<usize>,
        amps: Vec<f32>,
        mod_depth: f32,
        mod_envelope: EnvelopeSpec,
    },
}

/// Immutable description of how an instrument sounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentProfile {
    pub name: String,
    pub timbre: Timbre,
    #[serde(default)]
    pub envelope: EnvelopeSpec,
    #[serde(default = "default_gain")]
    pub gain: f32,
}

fn default_gain() -> f32 {
    0.8
}

impl InstrumentProfile {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "instrument name must not be empty".to_string(),
            ));
        }
        if !(self.gain.is_finite() && (0.0..=1.0).contains(&self.gain)) {
            return Err(ConvertError::InvalidConfig(format!(
                "instrument '{}' gain {} outside 0.0..=1.0",
                self.name, self.gain
            )));
        }
        self.envelope.validate()?;

        match &self.timbre {
            Timbre::Additive { partials, vibrato } => {
                if partials.is_empty() {
                    return Err(ConvertError::InvalidConfig(format!(
                        "instrument '{}' has no partials",
                        self.name
                    )));
                }
                if partials
                    .iter()
                    .any(|p| !(p.ratio > 0.0 && p.ratio.is_finite() && p.amplitude.is_finite()))
                {
                    return Err(ConvertError::InvalidConfig(format!(
                        "instrument '{}' has an invalid partial",
                        self.name
                    )));
                }
                if let Some(v) = vibrato {
                    if !(v.rate_hz >= 0.0 && (0.0..0.5).contains(&v.depth)) {
                        return Err(ConvertError::InvalidConfig(format!(
                            "instrument '{}' vibrato out of range",
                            self.name
                        )));
                    }
                }
            }
            Timbre::Fm {
                harmonics,
                amps,
                mod_depth,
                mod_envelope,
            } => {
                mod_envelope.validate()?;
                // A representative carrier checks the remaining FM parameters
                FmSynthParams::new(harmonics.clone(), amps.clone(), 0.1, *mod_depth)?;
            }
        }
        Ok(())
    }

    /// Build the generator for one note
    ///
    /// `note_samples` is how long the note is held; the release follows it.
    /// The frequency must be below Nyquist.
    pub fn voice(
        &self,
        frequency_hz: f32,
        sample_rate: u32,
        note_samples: usize,
    ) -> Result<Box<dyn SignalGenerator + Send>> {
        let envelope = AdsrGenerator::for_note(&self.envelope, sample_rate, note_samples);
        match &self.timbre {
            Timbre::Additive { partials, vibrato } => Ok(Box::new(AdditiveGenerator::new(
                frequency_hz,
                sample_rate,
                partials,
                *vibrato,
                envelope,
            ))),
            Timbre::Fm {
                harmonics,
                amps,
                mod_depth,
                mod_envelope,
            } => {
                let params = FmSynthParams::new(
                    harmonics.clone(),
                    amps.clone(),
                    FmSynthParams::phase_for(frequency_hz, sample_rate),
                    *mod_depth,
                )?;
                let mod_env = AdsrGenerator::for_note(mod_envelope, sample_rate, note_samples);
                Ok(Box::new(FmSynthGenerator::new(params, mod_env, envelope)))
            }
        }
    }
}

/// The built-in instrument set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    Piano,
    Strings,
    Guitar,
}

impl Instrument {
    pub const ALL: [Instrument; 3] = [Instrument::Piano, Instrument::Strings, Instrument::Guitar];

    pub fn name(&self) -> &'static str {
        match self {
            Instrument::Piano => "piano",
            Instrument::Strings => "strings",
            Instrument::Guitar => "guitar",
        }
    }

    pub fn profile(&self) -> InstrumentProfile {
        match self {
            // Bright attack, upper partials fade faster than the fundamental
            Instrument::Piano => InstrumentProfile {
                name: self.name().to_string(),
                timbre: Timbre::Additive {
                    partials: [1.0, 0.55, 0.35, 0.2, 0.12, 0.06]
                        .iter()
                        .enumerate()
                        .map(|(i, &amplitude)| Partial {
                            ratio: (i + 1) as f32,
                            amplitude,
                            decay_per_sec: 1.5 + 1.5 * i as f32,
                        })
                        .collect(),
                    vibrato: None,
                },
                envelope: EnvelopeSpec {
                    attack_secs: 0.005,
                    decay_secs: 0.4,
                    sustain_level: 0.5,
                    release_secs: 0.25,
                },
                gain: 0.8,
            },
            // Sawtooth-like spectrum, slow bow attack, gentle vibrato
            Instrument::Strings => InstrumentProfile {
                name: self.name().to_string(),
                timbre: Timbre::Additive {
                    partials: (1..=10)
                        .map(|n| Partial {
                            ratio: n as f32,
                            amplitude: 1.0 / n as f32,
                            decay_per_sec: 0.0,
                        })
                        .collect(),
                    vibrato: Some(Vibrato {
                        rate_hz: 5.5,
                        depth: 0.004,
                    }),
                },
                envelope: EnvelopeSpec {
                    attack_secs: 0.12,
                    decay_secs: 0.1,
                    sustain_level: 0.85,
                    release_secs: 0.3,
                },
                gain: 0.7,
            },
            // Plucked: modulation dies away quickly, leaving a rounder tone
            Instrument::Guitar => InstrumentProfile {
                name: self.name().to_string(),
                timbre: Timbre::Fm {
                    harmonics: vec![1, 3],
                    amps: vec![0.8, 0.3],
                    mod_depth: 1.0,
                    mod_envelope: EnvelopeSpec {
                        attack_secs: 0.001,
                        decay_secs: 0.15,
                        sustain_level: 0.1,
                        release_secs: 0.2,
                    },
                },
                envelope: EnvelopeSpec {
                    attack_secs: 0.003,
                    decay_secs: 0.6,
                    sustain_level: 0.3,
                    release_secs: 0.2,
                },
                gain: 0.8,
            },
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Instrument {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        Instrument::ALL
            .into_iter()
            .find(|i| i.name() == name)
            .ok_or_else(|| ConvertError::UnsupportedInstrument(s.to_string()))
    }
}

/// Built-in instruments plus any user-defined profiles, keyed by name
#[derive(Debug, Clone)]
pub struct InstrumentRegistry {
    profiles: BTreeMap<String, InstrumentProfile>,
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        let profiles = Instrument::ALL
            .iter()
            .map(|i| (i.name().to_string(), i.profile()))
            .collect();
        Self { profiles }
    }
}

impl InstrumentRegistry {
    /// Registry with the built-ins and `custom` profiles
    ///
    /// A custom profile with a built-in name replaces the built-in.
    pub fn with_profiles(custom: &[InstrumentProfile]) -> Result<Self> {
        let mut registry = Self::default();
        for profile in custom {
            registry.register(profile.clone())?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, profile: InstrumentProfile) -> Result<()> {
        profile.validate()?;
        let key = profile.name.trim().to_ascii_lowercase();
        if self.profiles.insert(key, profile).is_some() {
            log::debug!("instrument profile replaced an existing entry");
        }
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&InstrumentProfile> {
        self.profiles
            .get(&name.trim().to_ascii_lowercase())
            .ok_or_else(|| ConvertError::UnsupportedInstrument(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

//! Note quantizer: snaps detected notes to a scale and a tempo grid

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::note::{NoteEvent, QuantizedNoteEvent};
use crate::pipeline::notation::{PitchClass, DEFAULT_SUBDIVISION, DEFAULT_TEMPO_BPM};
use crate::pipeline::NoteQuantizer;

/// Tempo range that estimated tempos are folded into
pub const MIN_AUTO_BPM: f32 = 80.0;
pub const MAX_AUTO_BPM: f32 = 160.0;

const CHROMATIC: &[u8] = &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
const MAJOR: &[u8] = &[0, 2, 4, 5, 7, 9, 11];
const NATURAL_MINOR: &[u8] = &[0, 2, 3, 5, 7, 8, 10];
const MAJOR_PENTATONIC: &[u8] = &[0, 2, 4, 7, 9];
const MINOR_PENTATONIC: &[u8] = &[0, 3, 5, 7, 10];

/// Set of pitches notes may snap to
///
/// Written in configuration as `chromatic`, `major`, `minor:a`,
/// `pentatonic:g` or `minor-pentatonic:e`; the tonic defaults to C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scale {
    /// All twelve semitones of 12-TET
    #[default]
    Chromatic,
    Major(PitchClass),
    NaturalMinor(PitchClass),
    MajorPentatonic(PitchClass),
    MinorPentatonic(PitchClass),
}

impl Scale {
    fn parts(&self) -> (&'static str, &'static [u8], PitchClass) {
        match *self {
            Scale::Chromatic => ("chromatic", CHROMATIC, PitchClass::C),
            Scale::Major(tonic) => ("major", MAJOR, tonic),
            Scale::NaturalMinor(tonic) => ("minor", NATURAL_MINOR, tonic),
            Scale::MajorPentatonic(tonic) => ("pentatonic", MAJOR_PENTATONIC, tonic),
            Scale::MinorPentatonic(tonic) => ("minor-pentatonic", MINOR_PENTATONIC, tonic),
        }
    }

    /// Whether `midi` belongs to the scale
    pub fn contains(&self, midi: u8) -> bool {
        let (_, intervals, tonic) = self.parts();
        let degree = (midi % 12 + 12 - tonic.semitone()) % 12;
        intervals.contains(&degree)
    }

    /// Nearest scale pitch to a fractional MIDI value
    ///
    /// Distance is measured in semitones, which is log-frequency distance.
    /// Ties go to the lower pitch. The result stays within 0..=127.
    pub fn snap(&self, midi: f32) -> u8 {
        let target = midi.clamp(0.0, 127.0);
        let lo = (target.floor() as i32 - 12).max(0);
        let hi = (target.ceil() as i32 + 12).min(127);

        let mut best: Option<(u8, f32)> = None;
        for candidate in lo..=hi {
            let candidate = candidate as u8;
            if !self.contains(candidate) {
                continue;
            }
            let distance = (candidate as f32 - target).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((candidate, distance));
            }
        }
        // Every 12-semitone span holds a scale pitch
        best.map_or(target.round() as u8, |(m, _)| m)
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, _, tonic) = self.parts();
        match self {
            Scale::Chromatic => f.write_str(name),
            _ => write!(f, "{}:{}", name, tonic.as_str()),
        }
    }
}

impl FromStr for Scale {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let (name, tonic) = match s.split_once(':') {
            Some((name, tonic)) => {
                let tonic = tonic
                    .trim()
                    .parse::<PitchClass>()
                    .map_err(|e| ConvertError::InvalidConfig(format!("scale tonic: {}", e)))?;
                (name.trim(), tonic)
            }
            None => (s.as_str(), PitchClass::C),
        };

        match name {
            "chromatic" => Ok(Scale::Chromatic),
            "major" => Ok(Scale::Major(tonic)),
            "minor" | "natural-minor" => Ok(Scale::NaturalMinor(tonic)),
            "pentatonic" | "major-pentatonic" => Ok(Scale::MajorPentatonic(tonic)),
            "minor-pentatonic" => Ok(Scale::MinorPentatonic(tonic)),
            _ => Err(ConvertError::InvalidConfig(format!("unknown scale '{}'", s))),
        }
    }
}

impl TryFrom<String> for Scale {
    type Error = ConvertError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Scale> for String {
    fn from(scale: Scale) -> Self {
        scale.to_string()
    }
}

/// Settings for the note quantizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizerConfig {
    /// Fixed tempo; estimated from the note onsets when absent
    pub bpm: Option<f32>,
    /// Grid steps per beat (4 = sixteenth notes)
    pub subdivision: u32,
    pub scale: Scale,
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        Self {
            bpm: None,
            subdivision: DEFAULT_SUBDIVISION,
            scale: Scale::Chromatic,
        }
    }
}

impl QuantizerConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(bpm) = self.bpm {
            if !(bpm.is_finite() && bpm > 0.0) {
                return Err(ConvertError::InvalidConfig(format!(
                    "tempo {} BPM must be positive",
                    bpm
                )));
            }
        }
        if self.subdivision == 0 {
            return Err(ConvertError::InvalidConfig(
                "subdivision must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tempo implied by the spacing of note onsets
///
/// The median interval between distinct onsets is taken as one beat and the
/// result is folded by octaves into 80..=160 BPM. With fewer than two
/// distinct onsets the tempo is 120 BPM.
pub fn estimate_tempo(notes: &[NoteEvent]) -> f32 {
    let mut onsets: Vec<f32> = notes.iter().map(|n| n.onset_secs).collect();
    onsets.sort_by(f32::total_cmp);
    onsets.dedup_by(|a, b| (*a - *b).abs() < 1e-3);

    let mut intervals: Vec<f32> = onsets.windows(2).map(|w| w[1] - w[0]).collect();
    if intervals.is_empty() {
        return DEFAULT_TEMPO_BPM;
    }
    intervals.sort_by(f32::total_cmp);
    let mid = intervals.len() / 2;
    let median = if intervals.len() % 2 == 0 {
        (intervals[mid - 1] + intervals[mid]) / 2.0
    } else {
        intervals[mid]
    };

    let mut bpm = 60.0 / median;
    if !bpm.is_finite() {
        return DEFAULT_TEMPO_BPM;
    }
    while bpm < MIN_AUTO_BPM {
        bpm *= 2.0;
    }
    while bpm > MAX_AUTO_BPM {
        bpm /= 2.0;
    }
    bpm
}

/// Scale and grid quantizer
#[derive(Debug, Clone)]
pub struct Quantizer {
    config: QuantizerConfig,
}

impl Quantizer {
    pub fn new(config: QuantizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &QuantizerConfig {
        &self.config
    }

    /// Length of one grid step at `tempo_bpm`
    pub fn grid_secs(&self, tempo_bpm: f32) -> f32 {
        60.0 / tempo_bpm / self.config.subdivision as f32
    }
}

impl NoteQuantizer for Quantizer {
    fn tempo_bpm(&self, notes: &[NoteEvent]) -> f32 {
        self.config.bpm.unwrap_or_else(|| estimate_tempo(notes))
    }

    fn quantize_at(&self, notes: &[NoteEvent], tempo_bpm: f32) -> Result<Vec<QuantizedNoteEvent>> {
        if !(tempo_bpm.is_finite() && tempo_bpm > 0.0) {
            return Err(ConvertError::InvalidConfig(format!(
                "tempo {} BPM must be positive",
                tempo_bpm
            )));
        }
        let grid = self.grid_secs(tempo_bpm);

        let quantized = notes
            .iter()
            .map(|note| {
                if !(note.pitch_hz.is_finite() && note.pitch_hz > 0.0) {
                    return Err(ConvertError::InvalidInput(format!(
                        "note at {:.3}s has pitch {} Hz",
                        note.onset_secs, note.pitch_hz
                    )));
                }
                let onset_steps = (note.onset_secs / grid).round().max(0.0);
                let duration_steps = (note.duration_secs / grid).round().max(1.0);
                Ok(QuantizedNoteEvent {
                    midi_note: self.config.scale.snap(note.midi_pitch()),
                    onset_secs: onset_steps * grid,
                    duration_secs: duration_steps * grid,
                    amplitude: note.amplitude.clamp(0.0, 1.0),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "quantized {} notes at {:.1} BPM to {} (grid {:.3}s)",
            quantized.len(),
            tempo_bpm,
            self.config.scale,
            grid
        );
        Ok(quantized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::midi_to_hz;

    fn note(midi: f32, onset: f32, duration: f32) -> NoteEvent {
        NoteEvent {
            pitch_hz: midi_to_hz(midi),
            onset_secs: onset,
            duration_secs: duration,
            amplitude: 0.5,
        }
    }

    fn quantizer(bpm: Option<f32>, scale: Scale) -> Quantizer {
        Quantizer::new(QuantizerConfig {
            bpm,
            scale,
            ..QuantizerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_scale_parsing() {
        assert_eq!("chromatic".parse::<Scale>().unwrap(), Scale::Chromatic);
        assert_eq!("major".parse::<Scale>().unwrap(), Scale::Major(PitchClass::C));
        assert_eq!(
            "Minor:A".parse::<Scale>().unwrap(),
            Scale::NaturalMinor(PitchClass::A)
        );
        assert_eq!(
            "pentatonic:g".parse::<Scale>().unwrap(),
            Scale::MajorPentatonic(PitchClass::G)
        );
        assert!(matches!(
            "lydian".parse::<Scale>(),
            Err(ConvertError::InvalidConfig(_))
        ));
        assert!("major:h".parse::<Scale>().is_err());
        assert_eq!(Scale::MinorPentatonic(PitchClass::FSharp).to_string(), "minor-pentatonic:f#");
    }

    #[test]
    fn test_scale_membership() {
        let c_major = Scale::Major(PitchClass::C);
        assert!(c_major.contains(60));
        assert!(!c_major.contains(61));
        assert!(c_major.contains(71));

        let a_minor = Scale::NaturalMinor(PitchClass::A);
        assert!(a_minor.contains(69));
        assert!(a_minor.contains(72));
        assert!(!a_minor.contains(70));
    }

    #[test]
    fn test_snap_nearest_with_low_ties() {
        assert_eq!(Scale::Chromatic.snap(69.3), 69);
        assert_eq!(Scale::Chromatic.snap(69.7), 70);
        assert_eq!(Scale::Chromatic.snap(69.5), 69);

        // C# sits between C and D in C major
        let c_major = Scale::Major(PitchClass::C);
        assert_eq!(c_major.snap(61.0), 60);
        assert_eq!(c_major.snap(61.2), 62);

        assert_eq!(Scale::Chromatic.snap(-3.0), 0);
        assert_eq!(Scale::Chromatic.snap(140.0), 127);
        let b_minor_pentatonic = Scale::MinorPentatonic(PitchClass::B);
        assert!(b_minor_pentatonic.contains(b_minor_pentatonic.snap(0.0)));
    }

    #[test]
    fn test_grid_snap() {
        // 120 BPM, sixteenths: 0.125s grid
        let q = quantizer(Some(120.0), Scale::Chromatic);
        let out = q
            .quantize(&[note(69.2, 0.06, 0.48), note(71.0, 0.52, 0.02)])
            .unwrap();

        assert_eq!(out[0].midi_note, 69);
        assert!((out[0].onset_secs - 0.0).abs() < 1e-6);
        assert!((out[0].duration_secs - 0.5).abs() < 1e-6);
        assert!((out[1].onset_secs - 0.5).abs() < 1e-6);
        // Never shorter than one grid step
        assert!((out[1].duration_secs - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_preserves_length_and_order() {
        let notes: Vec<NoteEvent> = (0..20)
            .map(|i| note(55.0 + (i % 7) as f32 * 1.3, i as f32 * 0.21, 0.2))
            .collect();
        let scale = Scale::Major(PitchClass::D);
        let out = quantizer(None, scale).quantize(&notes).unwrap();

        assert_eq!(out.len(), notes.len());
        assert!(out.windows(2).all(|w| w[0].onset_secs <= w[1].onset_secs));
        assert!(out.iter().all(|n| scale.contains(n.midi_note)));
    }

    #[test]
    fn test_estimate_tempo() {
        assert_eq!(estimate_tempo(&[]), 120.0);
        assert_eq!(estimate_tempo(&[note(60.0, 0.5, 0.2)]), 120.0);

        // Half-second spacing is 120 BPM
        let steady: Vec<NoteEvent> = (0..5).map(|i| note(60.0, i as f32 * 0.5, 0.4)).collect();
        assert!((estimate_tempo(&steady) - 120.0).abs() < 1e-3);

        // 1.5s spacing is 40 BPM, folded up to 80
        let slow: Vec<NoteEvent> = (0..4).map(|i| note(60.0, i as f32 * 1.5, 1.0)).collect();
        assert!((estimate_tempo(&slow) - 80.0).abs() < 1e-3);

        // 0.2s spacing is 300 BPM, folded down to 150
        let fast: Vec<NoteEvent> = (0..6).map(|i| note(60.0, i as f32 * 0.2, 0.1)).collect();
        assert!((estimate_tempo(&fast) - 150.0).abs() < 1e-2);
    }

    #[test]
    fn test_invalid_config() {
        for bpm in [0.0, -10.0, f32::NAN] {
            let config = QuantizerConfig {
                bpm: Some(bpm),
                ..QuantizerConfig::default()
            };
            assert!(matches!(
                Quantizer::new(config),
                Err(ConvertError::InvalidConfig(_))
            ));
        }

        let config = QuantizerConfig {
            subdivision: 0,
            ..QuantizerConfig::default()
        };
        assert!(Quantizer::new(config).is_err());
    }

    #[test]
    fn test_scale_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            quantizer: QuantizerConfig,
        }
        let parsed: Wrapper = toml::from_str("[quantizer]\nbpm = 96.0\nscale = \"minor:e\"\n").unwrap();
        assert_eq!(parsed.quantizer.bpm, Some(96.0));
        assert_eq!(parsed.quantizer.subdivision, 4);
        assert_eq!(parsed.quantizer.scale, Scale::NaturalMinor(PitchClass::E));
    }
}

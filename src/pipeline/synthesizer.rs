//! Instrument synthesizer
//!
//! Every quantized note becomes one voice built from the instrument profile.
//! Voices render frame by frame into their own buffer and are mixed into the
//! output at their onset; the release tail of each voice is kept.

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::error::{ConvertError, Result};
use crate::generator::GeneratorState;
use crate::instrument::{InstrumentProfile, InstrumentRegistry};
use crate::note::QuantizedNoteEvent;
use crate::pipeline::NoteRenderer;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Settings for the instrument synthesizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Output sample rate; the input's rate when absent
    pub sample_rate: Option<u32>,
    /// Number of samples per frame
    pub frame_size: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: None,
            frame_size: 64,
        }
    }
}

impl SynthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == Some(0) {
            return Err(ConvertError::InvalidConfig(
                "output sample rate must be positive".to_string(),
            ));
        }
        if self.frame_size == 0 {
            return Err(ConvertError::InvalidConfig(
                "frame_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Placement of one note in the output, in samples
#[derive(Debug, Clone, Copy)]
struct VoiceSpan {
    onset: usize,
    held: usize,
    end: usize,
}

impl VoiceSpan {
    fn new(note: &QuantizedNoteEvent, profile: &InstrumentProfile, sample_rate: u32) -> Result<Self> {
        if !(note.onset_secs.is_finite() && note.duration_secs.is_finite() && note.amplitude.is_finite()) {
            return Err(ConvertError::InvalidInput(format!(
                "MIDI note {} has onset {}s, duration {}s and amplitude {}",
                note.midi_note, note.onset_secs, note.duration_secs, note.amplitude
            )));
        }

        let sr = sample_rate as f32;
        let onset = (note.onset_secs.max(0.0) * sr).round() as usize;
        let held = ((note.duration_secs * sr).round() as usize).max(1);
        let release = profile.envelope.release_samples(sample_rate);
        let end = onset
            .checked_add(held)
            .and_then(|n| n.checked_add(release))
            .ok_or_else(|| {
                ConvertError::InvalidInput(format!(
                    "MIDI note {} at {}s lasting {}s does not fit in an output buffer",
                    note.midi_note, note.onset_secs, note.duration_secs
                ))
            })?;

        Ok(Self { onset, held, end })
    }
}

/// Renders quantized notes with instrument profiles
#[derive(Debug, Clone)]
pub struct Synthesizer {
    config: SynthConfig,
    registry: InstrumentRegistry,
}

impl Synthesizer {
    pub fn new(config: SynthConfig, registry: InstrumentRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, registry })
    }

    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    /// Sample rate used when no rate is passed explicitly
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Render at the configured sample rate
    pub fn render_profile(
        &self,
        notes: &[QuantizedNoteEvent],
        profile: &InstrumentProfile,
    ) -> Result<AudioBuffer> {
        self.render_at(notes, profile, self.sample_rate())
    }

    /// Render with an instrument looked up by name
    pub fn render_named(&self, notes: &[QuantizedNoteEvent], instrument: &str) -> Result<AudioBuffer> {
        let profile = self.registry.resolve(instrument)?;
        self.render_profile(notes, profile)
    }

    /// Render `notes` at `sample_rate`
    ///
    /// The output runs until the last release tail ends; no notes give a
    /// zero-length buffer. The mix is clipped to [-1, 1].
    pub fn render_at(
        &self,
        notes: &[QuantizedNoteEvent],
        profile: &InstrumentProfile,
        sample_rate: u32,
    ) -> Result<AudioBuffer> {
        if sample_rate == 0 {
            return Err(ConvertError::InvalidConfig(
                "output sample rate must be positive".to_string(),
            ));
        }
        profile.validate()?;

        let spans = notes
            .iter()
            .map(|note| VoiceSpan::new(note, profile, sample_rate))
            .collect::<Result<Vec<_>>>()?;
        let total = spans.iter().map(|span| span.end).max().unwrap_or(0);

        let mut mix: Vec<f32> = Vec::new();
        mix.try_reserve_exact(total).map_err(|_| {
            ConvertError::InvalidInput(format!("cannot allocate {} output samples", total))
        })?;
        mix.resize(total, 0.0);

        let nyquist = sample_rate as f32 / 2.0;
        let mut frame = vec![0.0f32; self.config.frame_size];
        let mut voices = 0;

        for (note, span) in notes.iter().zip(&spans) {
            let frequency = note.frequency_hz();
            if frequency >= nyquist {
                log::warn!(
                    "skipping MIDI note {} ({:.1} Hz) at or above Nyquist ({:.1} Hz)",
                    note.midi_note,
                    frequency,
                    nyquist
                );
                continue;
            }

            let mut voice = profile.voice(frequency, sample_rate, span.held)?;
            let level = note.amplitude.clamp(0.0, 1.0) * profile.gain;
            let out = &mut mix[span.onset..span.end];

            let mut rendered = 0;
            while rendered < out.len() {
                // Frames are cut at the note end so the release starts on time
                let limit = if rendered < span.held {
                    span.held - rendered
                } else {
                    out.len() - rendered
                };
                let len = self.config.frame_size.min(limit).min(out.len() - rendered);
                let buffer = &mut frame[..len];

                let state = voice.process(buffer);
                for (dst, &src) in out[rendered..rendered + len].iter_mut().zip(buffer.iter()) {
                    *dst += src * level;
                }
                rendered += len;

                if state == GeneratorState::Complete {
                    break;
                }
                if rendered == span.held {
                    voice.note_off();
                }
            }
            voices += 1;
        }

        for sample in mix.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        log::debug!(
            "rendered {} of {} notes with '{}' into {} samples at {} Hz",
            voices,
            notes.len(),
            profile.name,
            mix.len(),
            sample_rate
        );
        Ok(AudioBuffer::new(mix, sample_rate))
    }
}

impl NoteRenderer for Synthesizer {
    fn render(
        &self,
        notes: &[QuantizedNoteEvent],
        profile: &InstrumentProfile,
        sample_rate: u32,
    ) -> Result<AudioBuffer> {
        self.render_at(notes, profile, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Instrument;

    fn synth() -> Synthesizer {
        Synthesizer::new(SynthConfig::default(), InstrumentRegistry::default()).unwrap()
    }

    fn a4(onset: f32, duration: f32) -> QuantizedNoteEvent {
        QuantizedNoteEvent {
            midi_note: 69,
            onset_secs: onset,
            duration_secs: duration,
            amplitude: 0.8,
        }
    }

    #[test]
    fn test_no_notes_gives_empty_buffer() {
        let out = synth().render_named(&[], "piano").unwrap();
        assert!(out.is_empty());
        assert_eq!(out.sample_rate(), 44100);
    }

    #[test]
    fn test_unsupported_instrument() {
        assert!(matches!(
            synth().render_named(&[a4(0.0, 0.5)], "kazoo"),
            Err(ConvertError::UnsupportedInstrument(_))
        ));
    }

    #[test]
    fn test_output_covers_notes_and_release() {
        let notes = [a4(0.0, 0.5), a4(0.5, 0.25)];
        for instrument in Instrument::ALL {
            let profile = instrument.profile();
            let out = synth().render_at(&notes, &profile, 22050).unwrap();

            let release = profile.envelope.release_samples(22050);
            // 0.5s onset plus 0.25s held (5512.5 samples, rounded up)
            assert_eq!(out.len(), 11025 + 5513 + release);
            assert!(out.duration_secs() >= 0.75);
            assert!(out.peak() > 0.05, "{} is silent", instrument);
            assert!(out.peak() <= 1.0);
        }
    }

    #[test]
    fn test_voice_starts_at_onset() {
        let profile = Instrument::Piano.profile();
        let out = synth().render_at(&[a4(0.5, 0.25)], &profile, 8000).unwrap();
        let samples = out.samples();

        assert!(samples[..4000].iter().all(|&s| s == 0.0));
        assert!(samples[4000..6000].iter().any(|&s| s.abs() > 0.01));
    }

    #[test]
    fn test_release_after_note_end() {
        let profile = Instrument::Strings.profile();
        let out = synth().render_at(&[a4(0.0, 0.5)], &profile, 8000).unwrap();
        let samples = out.samples();
        let release = profile.envelope.release_samples(8000);

        // The voice is still sounding just after the note ends and silent at the very end
        assert!(samples[4000..4200].iter().any(|&s| s.abs() > 0.01));
        assert!(samples[4000 + release - 4..].iter().all(|&s| s.abs() < 0.01));
    }

    #[test]
    fn test_nyquist_notes_skipped() {
        let profile = Instrument::Piano.profile();
        let high = QuantizedNoteEvent {
            midi_note: 127,
            onset_secs: 0.0,
            duration_secs: 0.1,
            amplitude: 1.0,
        };
        // MIDI 127 is ~12.5 kHz, above Nyquist at 8 kHz
        let out = synth().render_at(&[high], &profile, 8000).unwrap();
        assert!(!out.is_empty());
        assert!(out.samples().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mix_is_clipped() {
        let profile = Instrument::Guitar.profile();
        let chord: Vec<QuantizedNoteEvent> = (0..12)
            .map(|i| QuantizedNoteEvent {
                midi_note: 48 + i,
                onset_secs: 0.0,
                duration_secs: 0.3,
                amplitude: 1.0,
            })
            .collect();
        let out = synth().render_at(&chord, &profile, 16000).unwrap();
        assert!(out.samples().iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_deterministic() {
        let notes = [a4(0.0, 0.25), a4(0.25, 0.25)];
        let first = synth().render_named(&notes, "strings").unwrap();
        let second = synth().render_named(&notes, "strings").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unplayable_notes_rejected() {
        let far = a4(1e20, 0.5);
        let long = a4(0.0, f32::MAX);
        let unbounded = a4(f32::INFINITY, 0.5);
        let silent_nan = QuantizedNoteEvent {
            amplitude: f32::NAN,
            ..a4(0.0, 0.5)
        };

        for note in [far, long, unbounded, silent_nan] {
            assert!(
                matches!(
                    synth().render_named(&[a4(0.0, 0.25), note], "piano"),
                    Err(ConvertError::InvalidInput(_))
                ),
                "{:?} was accepted",
                note
            );
        }
    }

    #[test]
    fn test_invalid_config() {
        let config = SynthConfig {
            frame_size: 0,
            ..SynthConfig::default()
        };
        assert!(Synthesizer::new(config, InstrumentRegistry::default()).is_err());
    }
}

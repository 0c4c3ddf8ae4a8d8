//! Amplitude envelopes for instrument voices

use serde::{Deserialize, Serialize};

use super::{GeneratorState, SignalGenerator};
use crate::error::{ConvertError, Result};

/// Envelope timing of an instrument, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeSpec {
    pub attack_secs: f32,
    pub decay_secs: f32,
    /// Level held after the decay, 0.0 to 1.0
    pub sustain_level: f32,
    pub release_secs: f32,
}

impl Default for EnvelopeSpec {
    fn default() -> Self {
        Self {
            attack_secs: 0.01,
            decay_secs: 0.1,
            sustain_level: 0.7,
            release_secs: 0.2,
        }
    }
}

impl EnvelopeSpec {
    pub fn validate(&self) -> Result<()> {
        let times = [self.attack_secs, self.decay_secs, self.release_secs];
        if times.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ConvertError::InvalidConfig(format!(
                "envelope times must be finite and non-negative: {:?}",
                self
            )));
        }
        if !(0.0..=1.0).contains(&self.sustain_level) {
            return Err(ConvertError::InvalidConfig(format!(
                "sustain level {} outside 0.0..=1.0",
                self.sustain_level
            )));
        }
        Ok(())
    }

    /// Release length in samples (at least one)
    pub fn release_samples(&self, sample_rate: u32) -> usize {
        secs_to_samples(self.release_secs, sample_rate).max(1)
    }
}

fn secs_to_samples(secs: f32, sample_rate: u32) -> usize {
    (secs * sample_rate as f32).round().max(0.0) as usize
}

/// Linear ADSR amplitude envelope of one voice
///
/// Rises to 1.0, falls to the sustain level, holds it for at most
/// `sustain_max_samples`, then fades to silence from wherever it was when
/// the release began. The amplitude never jumps between phases.
/// `note_off` and the sustain limit are checked at frame boundaries.
pub struct AdsrGenerator {
    initial_amplitude: f32,
    attack_duration: usize,
    decay_duration: usize,
    sustain_level: f32,
    sustain_max_duration: usize,
    release_duration: usize,

    phase: AdsrPhase,
    position: usize,
    sustain_position: usize,
    current_amplitude: f32,
    release_start_amplitude: f32,
    pending_note_off: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdsrPhase {
    Attack,
    Decay,
    Sustain,
    Release,
    Complete,
}

impl AdsrGenerator {
    /// Create a new ADSR envelope generator; all durations are in samples
    ///
    /// # Example
    /// ```
    /// use voxtrum::generator::adsr::AdsrGenerator;
    ///
    /// let adsr = AdsrGenerator::new(
    ///     0.0,   // initial amplitude
    ///     441,   // attack: 10ms at 44.1kHz
    ///     4410,  // decay: 100ms
    ///     0.7,   // sustain level
    ///     44100, // max sustain: 1 second
    ///     8820,  // release: 200ms
    /// );
    /// assert_eq!(adsr.total_samples(), 441 + 4410 + 44100 + 8820);
    /// ```
    pub fn new(
        initial_amplitude: f32,
        attack_samples: usize,
        decay_samples: usize,
        sustain_level: f32,
        sustain_max_samples: usize,
        release_samples: usize,
    ) -> Self {
        let initial_amplitude = initial_amplitude.clamp(0.0, 1.0);
        Self {
            initial_amplitude,
            attack_duration: attack_samples.max(1),
            decay_duration: decay_samples.max(1),
            sustain_level: sustain_level.clamp(0.0, 1.0),
            sustain_max_duration: sustain_max_samples.max(1),
            release_duration: release_samples.max(1),
            phase: AdsrPhase::Attack,
            position: 0,
            sustain_position: 0,
            current_amplitude: initial_amplitude,
            release_start_amplitude: 0.0,
            pending_note_off: false,
        }
    }

    /// Envelope for a note held for `note_samples`
    ///
    /// The sustain phase is sized so the release starts when the note ends.
    /// Notes shorter than attack + decay need an explicit `note_off`.
    pub fn for_note(spec: &EnvelopeSpec, sample_rate: u32, note_samples: usize) -> Self {
        let attack = secs_to_samples(spec.attack_secs, sample_rate).max(1);
        let decay = secs_to_samples(spec.decay_secs, sample_rate).max(1);
        let sustain_max = note_samples.saturating_sub(attack + decay);
        Self::new(
            0.0,
            attack,
            decay,
            spec.sustain_level,
            sustain_max,
            spec.release_samples(sample_rate),
        )
    }

    pub fn note_off(&mut self) {
        self.pending_note_off = true;
    }

    pub fn current_amplitude(&self) -> f32 {
        self.current_amplitude
    }

    pub fn phase(&self) -> AdsrPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == AdsrPhase::Complete
    }

    /// Maximum envelope length: attack + decay + sustain_max + release
    pub fn total_samples(&self) -> usize {
        self.attack_duration
            + self.decay_duration
            + self.sustain_max_duration
            + self.release_duration
    }

    fn enter_release(&mut self) {
        self.phase = AdsrPhase::Release;
        self.release_start_amplitude = self.current_amplitude;
        self.position = 0;
    }

    fn process_events(&mut self) {
        if self.pending_note_off {
            self.pending_note_off = false;
            if matches!(
                self.phase,
                AdsrPhase::Attack | AdsrPhase::Decay | AdsrPhase::Sustain
            ) {
                self.enter_release();
            }
        }

        if self.phase == AdsrPhase::Sustain && self.sustain_position >= self.sustain_max_duration {
            self.enter_release();
        }
    }

    /// Write a linear segment from `from` to `to` over `total` samples
    ///
    /// Writes until the segment or the buffer ends and returns the number of
    /// samples written. Moves to `next` when the segment is finished.
    fn ramp(&mut self, buffer: &mut [f32], from: f32, to: f32, total: usize, next: AdsrPhase) -> usize {
        let remaining = total - self.position;
        let count = remaining.min(buffer.len());
        let denom = (total - 1).max(1) as f32;

        for (i, sample) in buffer[..count].iter_mut().enumerate() {
            let t = (self.position + i) as f32 / denom;
            self.current_amplitude = from + (to - from) * t;
            *sample = self.current_amplitude;
        }

        self.position += count;
        if self.position >= total {
            self.phase = next;
            self.position = 0;
            self.sustain_position = 0;
            if next == AdsrPhase::Complete {
                self.current_amplitude = 0.0;
            }
        }
        count
    }
}

impl SignalGenerator for AdsrGenerator {
    fn process(&mut self, buffer: &mut [f32]) -> GeneratorState {
        self.process_events();

        let mut offset = 0;
        while offset < buffer.len() {
            let rest = &mut buffer[offset..];
            offset += match self.phase {
                AdsrPhase::Attack => self.ramp(
                    rest,
                    self.initial_amplitude,
                    1.0,
                    self.attack_duration,
                    AdsrPhase::Decay,
                ),
                AdsrPhase::Decay => self.ramp(
                    rest,
                    1.0,
                    self.sustain_level,
                    self.decay_duration,
                    AdsrPhase::Sustain,
                ),
                AdsrPhase::Sustain => {
                    self.current_amplitude = self.sustain_level;
                    rest.fill(self.sustain_level);
                    self.sustain_position += rest.len();
                    rest.len()
                }
                AdsrPhase::Release => self.ramp(
                    rest,
                    self.release_start_amplitude,
                    0.0,
                    self.release_duration,
                    AdsrPhase::Complete,
                ),
                AdsrPhase::Complete => {
                    self.current_amplitude = 0.0;
                    rest.fill(0.0);
                    rest.len()
                }
            };
        }

        if self.phase == AdsrPhase::Complete {
            GeneratorState::Complete
        } else {
            GeneratorState::Running
        }
    }

    fn is_complete(&self) -> bool {
        self.is_complete()
    }

    fn reset(&mut self) {
        self.phase = AdsrPhase::Attack;
        self.position = 0;
        self.sustain_position = 0;
        self.current_amplitude = self.initial_amplitude;
        self.release_start_amplitude = 0.0;
        self.pending_note_off = false;
    }

    fn note_off(&mut self) {
        AdsrGenerator::note_off(self);
    }
}

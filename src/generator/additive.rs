use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use super::adsr::AdsrGenerator;
use super::{GeneratorState, SignalGenerator};

const TWO_PI: f32 = 2.0 * PI;

/// One sine component of an additive timbre
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Partial {
    /// Frequency as a multiple of the fundamental
    pub ratio: f32,
    /// Relative amplitude before normalization
    pub amplitude: f32,
    /// Exponential decay rate in 1/seconds (0 = no decay)
    #[serde(default)]
    pub decay_per_sec: f32,
}

/// Periodic pitch modulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vibrato {
    pub rate_hz: f32,
    /// Peak frequency deviation as a fraction of the fundamental
    pub depth: f32,
}

struct PartialState {
    phase_inc: f32,
    amplitude: f32,
    decay: f32,
    phase: f32,
    level: f32,
}

/// Sum of sine partials shaped by an ADSR envelope
///
/// Partial amplitudes are normalized so their sum is 1.0, which keeps the
/// output within [-1.0, 1.0]. Partials at or above Nyquist are dropped.
pub struct AdditiveGenerator {
    partials: Vec<PartialState>,
    vibrato: Option<(f32, f32)>,
    vibrato_phase: f32,
    envelope: AdsrGenerator,
    env_buffer: Vec<f32>,
}

impl AdditiveGenerator {
    pub fn new(
        frequency_hz: f32,
        sample_rate: u32,
        partials: &[Partial],
        vibrato: Option<Vibrato>,
        envelope: AdsrGenerator,
    ) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        let audible: Vec<&Partial> = partials
            .iter()
            .filter(|p| p.ratio > 0.0 && frequency_hz * p.ratio < nyquist)
            .collect();
        let total: f32 = audible.iter().map(|p| p.amplitude.abs()).sum();
        let norm = if total > 0.0 { 1.0 / total } else { 0.0 };

        let partials = audible
            .into_iter()
            .map(|p| PartialState {
                phase_inc: TWO_PI * frequency_hz * p.ratio / sample_rate as f32,
                amplitude: p.amplitude * norm,
                decay: (-p.decay_per_sec.max(0.0) / sample_rate as f32).exp(),
                phase: 0.0,
                level: 1.0,
            })
            .collect();

        let vibrato = vibrato.map(|v| (TWO_PI * v.rate_hz / sample_rate as f32, v.depth));

        Self {
            partials,
            vibrato,
            vibrato_phase: 0.0,
            envelope,
            env_buffer: Vec::new(),
        }
    }

    pub fn partial_count(&self) -> usize {
        self.partials.len()
    }
}

impl SignalGenerator for AdditiveGenerator {
    fn process(&mut self, buffer: &mut [f32]) -> GeneratorState {
        self.env_buffer.resize(buffer.len(), 0.0);
        let state = self.envelope.process(&mut self.env_buffer);

        for (sample, &env) in buffer.iter_mut().zip(&self.env_buffer) {
            let bend = match self.vibrato {
                Some((inc, depth)) => {
                    self.vibrato_phase = (self.vibrato_phase + inc) % TWO_PI;
                    1.0 + depth * self.vibrato_phase.sin()
                }
                None => 1.0,
            };

            let mut value = 0.0f32;
            for partial in self.partials.iter_mut() {
                value += partial.phase.sin() * partial.amplitude * partial.level;
                partial.phase = (partial.phase + partial.phase_inc * bend) % TWO_PI;
                partial.level *= partial.decay;
            }
            *sample = value * env;
        }

        state
    }

    fn is_complete(&self) -> bool {
        self.envelope.is_complete()
    }

    fn reset(&mut self) {
        self.envelope.reset();
        self.vibrato_phase = 0.0;
        for partial in self.partials.iter_mut() {
            partial.phase = 0.0;
            partial.level = 1.0;
        }
    }

    fn note_off(&mut self) {
        self.envelope.note_off();
    }
}

use std::f32::consts::PI;

use super::adsr::AdsrGenerator;
use super::{GeneratorState, SignalGenerator};
use crate::error::{ConvertError, Result};

const TWO_PI: f32 = 2.0 * PI;

/// Parameters for FM synthesis
///
/// All values are in sample-level units:
/// - phase_per_sample: carrier phase change per sample in radians
/// - harmonics: modulator frequency multipliers relative to the carrier
/// - amps: modulation amplitudes for each harmonic
/// - mod_depth: overall modulation depth scaling (0 = no FM)
#[derive(Debug, Clone)]
pub struct FmSynthParams {
    pub harmonics: Vec<usize>,
    pub amps: Vec<f32>,
    pub phase_per_sample: f32,
    pub mod_depth: f32,
}

impl FmSynthParams {
    pub fn new(
        harmonics: Vec<usize>,
        amps: Vec<f32>,
        phase_per_sample: f32,
        mod_depth: f32,
    ) -> Result<Self> {
        if harmonics.len() != amps.len() {
            return Err(ConvertError::InvalidConfig(format!(
                "FM harmonics ({}) and amps ({}) must have the same length",
                harmonics.len(),
                amps.len()
            )));
        }
        if !(phase_per_sample > 0.0 && phase_per_sample < PI) {
            return Err(ConvertError::InvalidConfig(format!(
                "phase_per_sample {} must be between 0 and PI",
                phase_per_sample
            )));
        }
        if !(mod_depth >= 0.0 && mod_depth.is_finite()) {
            return Err(ConvertError::InvalidConfig(format!(
                "mod_depth {} must be finite and non-negative",
                mod_depth
            )));
        }
        Ok(Self {
            harmonics,
            amps,
            phase_per_sample,
            mod_depth,
        })
    }

    /// Carrier phase increment for a frequency, in radians per sample
    pub fn phase_for(frequency_hz: f32, sample_rate: u32) -> f32 {
        TWO_PI * frequency_hz / sample_rate as f32
    }
}

/// FM synthesis generator with separate modulation and output envelopes
///
/// Per sample:
/// 1. m[n] = Σ amps[i] * sin(φ_i[n]), φ_i advancing by harmonics[i] * phase_per_sample
/// 2. e[n] from mod_env, E[n] from wav_env
/// 3. θ[n] = θ[n-1] + phase_per_sample * (1 + m[n] * mod_depth * e[n]), wrapped to [0, 2π)
/// 4. y[n] = sin(θ[n]) * E[n]
pub struct FmSynthGenerator {
    params: FmSynthParams,
    mod_env: AdsrGenerator,
    wav_env: AdsrGenerator,
    phase: f32,
    mod_phases: Vec<f32>,
    sample_count: usize,
    mod_env_buffer: Vec<f32>,
    wav_env_buffer: Vec<f32>,
}

impl FmSynthGenerator {
    pub fn new(params: FmSynthParams, mod_env: AdsrGenerator, wav_env: AdsrGenerator) -> Self {
        let mod_total = mod_env.total_samples();
        let wav_total = wav_env.total_samples();
        if mod_total < wav_total {
            log::warn!(
                "FM modulation envelope ({} samples) ends {} samples before the output envelope",
                mod_total,
                wav_total - mod_total
            );
        }

        let mod_phases = vec![0.0; params.harmonics.len()];
        Self {
            params,
            mod_env,
            wav_env,
            phase: 0.0,
            mod_phases,
            sample_count: 0,
            mod_env_buffer: Vec::new(),
            wav_env_buffer: Vec::new(),
        }
    }

    fn compute_modulation(&self) -> f32 {
        self.mod_phases
            .iter()
            .zip(&self.params.amps)
            .map(|(phase, amp)| amp * phase.sin())
            .sum()
    }

    fn advance_modulators(&mut self) {
        for (phase, &harmonic) in self.mod_phases.iter_mut().zip(&self.params.harmonics) {
            *phase = (*phase + harmonic as f32 * self.params.phase_per_sample) % TWO_PI;
        }
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}

impl SignalGenerator for FmSynthGenerator {
    fn process(&mut self, buffer: &mut [f32]) -> GeneratorState {
        self.mod_env_buffer.resize(buffer.len(), 0.0);
        self.wav_env_buffer.resize(buffer.len(), 0.0);
        let mod_state = self.mod_env.process(&mut self.mod_env_buffer);
        let wav_state = self.wav_env.process(&mut self.wav_env_buffer);

        for (i, sample) in buffer.iter_mut().enumerate() {
            let modulation = self.compute_modulation();
            let inst_freq = self.params.phase_per_sample
                * (1.0 + modulation * self.params.mod_depth * self.mod_env_buffer[i]);

            self.phase = (self.phase + inst_freq).rem_euclid(TWO_PI);
            *sample = self.phase.sin() * self.wav_env_buffer[i];

            self.advance_modulators();
            self.sample_count += 1;
        }

        // The output envelope decides when the voice is silent
        if wav_state == GeneratorState::Complete {
            if mod_state != GeneratorState::Complete {
                log::trace!("FM voice finished with modulation envelope still running");
            }
            GeneratorState::Complete
        } else {
            GeneratorState::Running
        }
    }

    fn is_complete(&self) -> bool {
        self.wav_env.is_complete()
    }

    fn reset(&mut self) {
        self.mod_env.reset();
        self.wav_env.reset();
        self.phase = 0.0;
        self.mod_phases.iter_mut().for_each(|p| *p = 0.0);
        self.sample_count = 0;
    }

    fn note_off(&mut self) {
        self.mod_env.note_off();
        self.wav_env.note_off();
    }
}

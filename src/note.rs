//! Note events exchanged between the analysis, quantization and synthesis stages

use serde::{Deserialize, Serialize};

/// Frequency of A4 (MIDI note 69)
pub const A4_HZ: f32 = 440.0;
pub const A4_MIDI: f32 = 69.0;

/// Fractional MIDI number for a frequency (A4 = 69.0)
pub fn hz_to_midi(frequency_hz: f32) -> f32 {
    A4_MIDI + 12.0 * (frequency_hz / A4_HZ).log2()
}

/// Frequency of a (possibly fractional) MIDI number in 12-TET
pub fn midi_to_hz(midi: f32) -> f32 {
    A4_HZ * 2f32.powf((midi - A4_MIDI) / 12.0)
}

/// A note detected in the input recording
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Fundamental frequency in Hz
    pub pitch_hz: f32,
    pub onset_secs: f32,
    pub duration_secs: f32,
    /// Peak level, 0.0 to 1.0
    pub amplitude: f32,
}

impl NoteEvent {
    pub fn midi_pitch(&self) -> f32 {
        hz_to_midi(self.pitch_hz)
    }

    pub fn end_secs(&self) -> f32 {
        self.onset_secs + self.duration_secs
    }
}

/// A note snapped to a scale pitch and a tempo grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizedNoteEvent {
    pub midi_note: u8,
    pub onset_secs: f32,
    /// Always at least one grid unit
    pub duration_secs: f32,
    pub amplitude: f32,
}

impl QuantizedNoteEvent {
    pub fn frequency_hz(&self) -> f32 {
        midi_to_hz(self.midi_note as f32)
    }

    pub fn end_secs(&self) -> f32 {
        self.onset_secs + self.duration_secs
    }
}

//! Conversion pipeline
//!
//! Three stages composed linearly, each behind its own trait:
//! - `NoteExtractor`: audio to detected note events (see `crate::analysis`)
//! - `NoteQuantizer`: detected notes snapped to a scale and a tempo grid
//! - `NoteRenderer`: quantized notes played by an instrument profile
//!
//! `Converter` drives the three stages; `notation` reads and writes quantized
//! notes as text.

pub mod converter;
pub mod notation;
pub mod quantizer;
pub mod synthesizer;

pub use converter::{Conversion, Converter};
pub use notation::{
    parse_transcription, write_transcription, KeyDirection, KeyEvent, NotationError, NoteName,
    PitchClass, TimedEvents, Transcription,
};
pub use quantizer::{estimate_tempo, Quantizer, QuantizerConfig, Scale};
pub use synthesizer::{SynthConfig, Synthesizer};

use crate::audio::AudioBuffer;
use crate::error::Result;
use crate::instrument::InstrumentProfile;
use crate::note::{NoteEvent, QuantizedNoteEvent};

/// Turns a mono recording into detected notes, ordered by onset
pub trait NoteExtractor {
    fn extract(&self, audio: &AudioBuffer) -> Result<Vec<NoteEvent>>;
}

/// Snaps detected notes to musical pitches and a rhythmic grid
pub trait NoteQuantizer {
    /// Tempo used to quantize `notes`
    fn tempo_bpm(&self, notes: &[NoteEvent]) -> f32;

    /// One quantized note per input note, in input order, at `tempo_bpm`
    fn quantize_at(&self, notes: &[NoteEvent], tempo_bpm: f32) -> Result<Vec<QuantizedNoteEvent>>;

    /// Quantize at the tempo reported by `tempo_bpm`
    fn quantize(&self, notes: &[NoteEvent]) -> Result<Vec<QuantizedNoteEvent>> {
        self.quantize_at(notes, self.tempo_bpm(notes))
    }
}

/// Plays quantized notes with an instrument
pub trait NoteRenderer {
    fn render(
        &self,
        notes: &[QuantizedNoteEvent],
        profile: &InstrumentProfile,
        sample_rate: u32,
    ) -> Result<AudioBuffer>;
}

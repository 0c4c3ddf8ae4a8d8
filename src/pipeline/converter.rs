//! Converter: runs extraction, quantization and synthesis in order
//!
//! Configuration and instrument are checked when the converter is built, so a
//! bad request fails before any audio is analysed.

use crate::analysis::PitchExtractor;
use crate::audio::AudioBuffer;
use crate::config::ConversionConfig;
use crate::error::{ConvertError, Result};
use crate::instrument::{InstrumentProfile, InstrumentRegistry};
use crate::note::{NoteEvent, QuantizedNoteEvent};
use crate::pipeline::quantizer::Quantizer;
use crate::pipeline::synthesizer::Synthesizer;
use crate::pipeline::{NoteExtractor, NoteQuantizer, NoteRenderer};

/// Everything one conversion produced
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// Notes detected in the input, ordered by onset
    pub notes: Vec<NoteEvent>,
    /// The same notes snapped to scale and grid
    pub quantized: Vec<QuantizedNoteEvent>,
    pub tempo_bpm: f32,
    /// The melody played by the instrument
    pub audio: AudioBuffer,
}

/// Voice-to-instrument converter
pub struct Converter {
    extractor: Box<dyn NoteExtractor + Send + Sync>,
    quantizer: Box<dyn NoteQuantizer + Send + Sync>,
    renderer: Box<dyn NoteRenderer + Send + Sync>,
    profile: InstrumentProfile,
    sample_rate: Option<u32>,
}

impl Converter {
    /// Build the stages described by `config`
    ///
    /// Fails with `InvalidConfig` or `UnsupportedInstrument` before any audio
    /// is touched.
    pub fn new(config: &ConversionConfig) -> Result<Self> {
        config.validate()?;
        let registry = InstrumentRegistry::with_profiles(&config.instruments)?;
        let profile = registry.resolve(&config.instrument)?.clone();

        Ok(Self {
            extractor: Box::new(PitchExtractor::new(config.extractor.clone())?),
            quantizer: Box::new(Quantizer::new(config.quantizer.clone())?),
            renderer: Box::new(Synthesizer::new(
                config.synth.clone(),
                InstrumentRegistry::default(),
            )?),
            profile,
            sample_rate: config.synth.sample_rate,
        })
    }

    /// Converter from custom stages
    pub fn from_stages(
        extractor: Box<dyn NoteExtractor + Send + Sync>,
        quantizer: Box<dyn NoteQuantizer + Send + Sync>,
        renderer: Box<dyn NoteRenderer + Send + Sync>,
        profile: InstrumentProfile,
        sample_rate: Option<u32>,
    ) -> Result<Self> {
        profile.validate()?;
        if sample_rate == Some(0) {
            return Err(ConvertError::InvalidConfig(
                "output sample rate must be positive".to_string(),
            ));
        }
        Ok(Self {
            extractor,
            quantizer,
            renderer,
            profile,
            sample_rate,
        })
    }

    pub fn instrument(&self) -> &InstrumentProfile {
        &self.profile
    }

    /// Detected and quantized notes without rendering
    pub fn transcribe(&self, input: &AudioBuffer) -> Result<(Vec<NoteEvent>, Vec<QuantizedNoteEvent>, f32)> {
        input.validate()?;

        let notes = self.extractor.extract(input)?;
        let tempo_bpm = self.quantizer.tempo_bpm(&notes);
        let quantized = self.quantizer.quantize_at(&notes, tempo_bpm)?;
        Ok((notes, quantized, tempo_bpm))
    }

    /// Render already quantized notes with this converter's instrument
    pub fn render(&self, notes: &[QuantizedNoteEvent], sample_rate: u32) -> Result<AudioBuffer> {
        self.renderer
            .render(notes, &self.profile, self.sample_rate.unwrap_or(sample_rate))
    }

    /// Convert a voice recording into the same melody on the instrument
    ///
    /// The output uses the configured sample rate, or the input's.
    pub fn convert(&self, input: &AudioBuffer) -> Result<Conversion> {
        let (notes, quantized, tempo_bpm) = self.transcribe(input)?;
        let audio = self.render(&quantized, input.sample_rate())?;

        log::info!(
            "converted {:.2}s of voice into {} notes at {:.1} BPM, {:.2}s of {}",
            input.duration_secs(),
            quantized.len(),
            tempo_bpm,
            audio.duration_secs(),
            self.profile.name
        );

        Ok(Conversion {
            notes,
            quantized,
            tempo_bpm,
            audio,
        })
    }
}

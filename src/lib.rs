//! voxtrum: turns a hummed or sung melody into the same melody played by an
//! instrument
//!
//! ```text
//! raw audio -> note events -> quantized note events -> synthesized audio
//! ```
//!
//! - `analysis`: YIN pitch tracking and energy-based note segmentation
//! - `pipeline::quantizer`: scale and tempo-grid snapping
//! - `pipeline::synthesizer`: additive and FM instrument voices
//! - `pipeline::converter`: the three stages in one call

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod generator;
pub mod instrument;
pub mod note;
pub mod pipeline;
pub mod wav;

pub use audio::AudioBuffer;
pub use config::ConversionConfig;
pub use error::{ConvertError, Result};
pub use instrument::{Instrument, InstrumentProfile, InstrumentRegistry};
pub use note::{NoteEvent, QuantizedNoteEvent};
pub use pipeline::{Conversion, Converter};

//! Error type shared by every stage of the conversion pipeline

use crate::pipeline::notation::NotationError;

/// Errors from conversion operations.
///
/// Degenerate analysis (no notes found) is not an error: the pipeline returns
/// an empty note sequence and a zero-length output buffer instead.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Empty, zero-length, zero-sample-rate or non-finite audio
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Instrument name is neither built in nor registered
    #[error("unsupported instrument: {0}")]
    UnsupportedInstrument(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("transcription error: {0}")]
    Notation(#[from] NotationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("config file error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

//! Frame-based signal generators used to render instrument voices

pub mod additive;
pub mod adsr;
pub mod fm_synth;

pub use additive::{AdditiveGenerator, Partial, Vibrato};
pub use adsr::{AdsrGenerator, AdsrPhase, EnvelopeSpec};
pub use fm_synth::{FmSynthGenerator, FmSynthParams};

/// Represents the current state of a signal generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Generator is still producing samples
    Running,
    /// Generator has completed and will produce no more samples
    Complete,
}

/// Core trait for all signal generators
///
/// Signal generators produce audio samples frame by frame. Each one is
/// independent; voices are rendered separately and mixed afterwards.
pub trait SignalGenerator {
    /// Process the next frame of samples
    ///
    /// The length of `buffer` determines the frame size. Even when `Complete`
    /// is returned the whole buffer is filled (zeros past the end).
    fn process(&mut self, buffer: &mut [f32]) -> GeneratorState;

    /// Check if this generator has completed
    fn is_complete(&self) -> bool;

    /// Reset the generator to its initial state
    fn reset(&mut self);

    /// Start the release phase at the next frame boundary
    fn note_off(&mut self);
}

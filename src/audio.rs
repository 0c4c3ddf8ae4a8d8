//! Mono audio buffer passed between the pipeline stages

use crate::error::{ConvertError, Result};

/// Single-channel block of f32 samples at a declared sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// A buffer of `len` zero samples
    pub fn silent(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    /// Build a mono buffer from interleaved multichannel samples
    ///
    /// Each frame is downmixed to the arithmetic mean of its channels. A
    /// trailing partial frame is averaged over the channels it has.
    pub fn from_interleaved(interleaved: &[f32], channels: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(ConvertError::InvalidInput(
                "channel count must be at least 1".to_string(),
            ));
        }
        if channels == 1 {
            return Ok(Self::new(interleaved.to_vec(), sample_rate));
        }

        let samples = interleaved
            .chunks(channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        Ok(Self::new(samples, sample_rate))
    }

    /// Check the invariants required of pipeline input
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ConvertError::InvalidInput(
                "sample rate must be non-zero".to_string(),
            ));
        }
        if self.samples.is_empty() {
            return Err(ConvertError::InvalidInput("buffer is empty".to_string()));
        }
        if let Some(idx) = self.samples.iter().position(|s| !s.is_finite()) {
            return Err(ConvertError::InvalidInput(format!(
                "non-finite sample at index {}",
                idx
            )));
        }
        Ok(())
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds (0.0 when the sample rate is zero)
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty() {
        let buffer = AudioBuffer::new(vec![], 44100);
        assert!(matches!(
            buffer.validate(),
            Err(ConvertError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_sample_rate() {
        let buffer = AudioBuffer::new(vec![0.0; 10], 0);
        assert!(matches!(
            buffer.validate(),
            Err(ConvertError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let buffer = AudioBuffer::new(vec![0.0, 0.5, f32::NAN, 0.1], 16000);
        match buffer.validate() {
            Err(ConvertError::InvalidInput(msg)) => assert!(msg.contains("index 2")),
            other => panic!("expected InvalidInput, got {:?}", other),
        }

        let buffer = AudioBuffer::new(vec![f32::INFINITY], 16000);
        assert!(buffer.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_silence() {
        let buffer = AudioBuffer::silent(100, 16000);
        assert!(buffer.validate().is_ok());
    }

    #[test]
    fn test_downmix_stereo() {
        let interleaved = [1.0f32, 0.0, 0.5, 0.5, -1.0, 1.0];
        let buffer = AudioBuffer::from_interleaved(&interleaved, 2, 8000).unwrap();
        assert_eq!(buffer.samples(), &[0.5, 0.5, 0.0]);
        assert_eq!(buffer.sample_rate(), 8000);
    }

    #[test]
    fn test_downmix_zero_channels() {
        assert!(AudioBuffer::from_interleaved(&[0.0], 0, 8000).is_err());
    }

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::silent(22050, 44100);
        assert!((buffer.duration_secs() - 0.5).abs() < 1e-6);
        assert_eq!(AudioBuffer::silent(10, 0).duration_secs(), 0.0);
    }
}

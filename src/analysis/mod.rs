//! Pitch & onset extraction: raw voice audio to note events
//!
//! The buffer is cut into overlapping windows. Each window gets an RMS level
//! and a YIN pitch estimate; windows are independent, so this step can run on
//! the rayon pool. A sequential pass then gates windows against a rolling
//! noise floor and groups them into notes.

pub mod onset;
pub mod yin;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::error::{ConvertError, Result};
use crate::note::NoteEvent;
use crate::pipeline::NoteExtractor;
use onset::{rms, segment_notes, SegmenterParams};
use yin::{PitchEstimate, YinDetector};

/// Settings for the pitch & onset extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Analysis window length in samples
    pub window_size: usize,
    /// Distance between window starts in samples
    pub hop_size: usize,
    pub fmin_hz: f32,
    pub fmax_hz: f32,
    /// YIN absolute threshold on the normalized difference
    pub yin_threshold: f32,
    /// Windows below this RMS are silence regardless of the noise floor
    pub silence_threshold: f32,
    /// How far above the noise floor a window must be to count as active
    pub onset_ratio: f32,
    pub min_noise_floor: f32,
    pub noise_adapt_rate: f32,
    /// Pitch jump between consecutive windows that starts a new note
    pub pitch_tolerance_semitones: f32,
    pub min_note_secs: f32,
    /// Analyse windows on the rayon thread pool
    pub parallel: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            window_size: 2048,
            hop_size: 1024,
            fmin_hz: 60.0,
            fmax_hz: 1500.0,
            yin_threshold: 0.15,
            silence_threshold: 0.01,
            onset_ratio: 4.0,
            min_noise_floor: 1e-4,
            noise_adapt_rate: 0.1,
            pitch_tolerance_semitones: 0.5,
            min_note_secs: 0.05,
            parallel: true,
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(ConvertError::InvalidConfig(msg));

        if self.window_size < 64 {
            return fail(format!("window_size {} is below 64", self.window_size));
        }
        if self.hop_size == 0 || self.hop_size > self.window_size {
            return fail(format!(
                "hop_size {} must be in 1..={}",
                self.hop_size, self.window_size
            ));
        }
        if !(self.fmin_hz > 0.0 && self.fmin_hz < self.fmax_hz && self.fmax_hz.is_finite()) {
            return fail(format!(
                "pitch range {}..{} Hz is invalid",
                self.fmin_hz, self.fmax_hz
            ));
        }
        if !(self.yin_threshold > 0.0 && self.yin_threshold < 1.0) {
            return fail(format!("yin_threshold {} outside (0, 1)", self.yin_threshold));
        }
        if !(self.silence_threshold >= 0.0 && self.min_noise_floor > 0.0) {
            return fail("silence_threshold and min_noise_floor must be positive".to_string());
        }
        if !(self.onset_ratio >= 1.0) {
            return fail(format!("onset_ratio {} is below 1.0", self.onset_ratio));
        }
        if !(self.noise_adapt_rate > 0.0 && self.noise_adapt_rate <= 1.0) {
            return fail(format!(
                "noise_adapt_rate {} outside (0, 1]",
                self.noise_adapt_rate
            ));
        }
        if !(self.pitch_tolerance_semitones > 0.0 && self.min_note_secs >= 0.0) {
            return fail("pitch tolerance and minimum note length must be positive".to_string());
        }
        Ok(())
    }
}

/// Level and pitch of one analysis window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowAnalysis {
    pub index: usize,
    /// First sample of the window
    pub start: usize,
    /// Number of samples in the window (shorter for the final window)
    pub len: usize,
    pub rms: f32,
    pub pitch: Option<PitchEstimate>,
}

impl WindowAnalysis {
    /// Centre of the window in seconds
    pub fn center_secs(&self, sample_rate: u32) -> f32 {
        (self.start as f32 + self.len as f32 / 2.0) / sample_rate as f32
    }
}

/// Monophonic pitch & onset extractor
#[derive(Debug, Clone)]
pub struct PitchExtractor {
    config: ExtractorConfig,
}

impl PitchExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Level and pitch of every analysis window, in window order
    pub fn analyze_windows(&self, audio: &AudioBuffer) -> Result<Vec<WindowAnalysis>> {
        audio.validate()?;

        let samples = audio.samples();
        let n = samples.len();
        let window = self.config.window_size;
        let hop = self.config.hop_size;
        let count = if n <= window {
            1
        } else {
            1 + (n - window).div_ceil(hop)
        };

        let detector = YinDetector::new(
            audio.sample_rate(),
            window,
            self.config.fmin_hz,
            self.config.fmax_hz,
            self.config.yin_threshold,
        );
        let silence = self.config.silence_threshold;

        let analyze = |index: usize| {
            let start = index * hop;
            let frame = &samples[start..(start + window).min(n)];
            let level = rms(frame);
            let pitch = if level >= silence {
                detector.estimate(frame)
            } else {
                None
            };
            WindowAnalysis {
                index,
                start,
                len: frame.len(),
                rms: level,
                pitch,
            }
        };

        let windows: Vec<WindowAnalysis> = if self.config.parallel {
            (0..count).into_par_iter().map(&analyze).collect()
        } else {
            (0..count).map(&analyze).collect()
        };

        log::debug!(
            "analysed {} windows, {} voiced",
            windows.len(),
            windows.iter().filter(|w| w.pitch.is_some()).count()
        );
        Ok(windows)
    }

    fn segmenter_params(&self, sample_rate: u32) -> SegmenterParams {
        SegmenterParams {
            sample_rate,
            silence_threshold: self.config.silence_threshold,
            onset_ratio: self.config.onset_ratio,
            min_noise_floor: self.config.min_noise_floor,
            noise_adapt_rate: self.config.noise_adapt_rate,
            pitch_tolerance_semitones: self.config.pitch_tolerance_semitones,
            min_note_secs: self.config.min_note_secs,
        }
    }
}

impl NoteExtractor for PitchExtractor {
    fn extract(&self, audio: &AudioBuffer) -> Result<Vec<NoteEvent>> {
        let windows = self.analyze_windows(audio)?;
        let notes = segment_notes(&windows, &self.segmenter_params(audio.sample_rate()));
        log::debug!(
            "extracted {} notes from {:.2}s of audio",
            notes.len(),
            audio.duration_secs()
        );
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(freq: f32, secs: f32, sample_rate: u32, amp: f32) -> Vec<f32> {
        let len = (secs * sample_rate as f32) as usize;
        (0..len)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn extractor() -> PitchExtractor {
        PitchExtractor::new(ExtractorConfig::default()).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(ExtractorConfig::default().validate().is_ok());

        let bad_hop = ExtractorConfig {
            hop_size: 4096,
            ..ExtractorConfig::default()
        };
        assert!(PitchExtractor::new(bad_hop).is_err());

        let bad_range = ExtractorConfig {
            fmin_hz: 2000.0,
            ..ExtractorConfig::default()
        };
        assert!(matches!(
            bad_range.validate(),
            Err(ConvertError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_window_layout() {
        let audio = AudioBuffer::silent(44100, 44100);
        let windows = extractor().analyze_windows(&audio).unwrap();

        assert_eq!(windows.len(), 43);
        assert_eq!(windows[1].start, 1024);
        assert_eq!(windows[0].len, 2048);
        let last = windows.last().unwrap();
        assert_eq!(last.start + last.len, 44100);
    }

    #[test]
    fn test_buffer_shorter_than_window() {
        let audio = AudioBuffer::new(tone(440.0, 0.02, 44100, 0.5), 44100);
        let windows = extractor().analyze_windows(&audio).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len, 882);
    }

    #[test]
    fn test_silence_returns_no_notes() {
        let audio = AudioBuffer::silent(44100, 44100);
        assert!(extractor().extract(&audio).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_input() {
        let empty = AudioBuffer::new(vec![], 44100);
        assert!(matches!(
            extractor().extract(&empty),
            Err(ConvertError::InvalidInput(_))
        ));

        let nan = AudioBuffer::new(vec![0.0, f32::NAN], 44100);
        assert!(matches!(
            extractor().extract(&nan),
            Err(ConvertError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_sustained_tone_is_one_note() {
        let audio = AudioBuffer::new(tone(440.0, 1.0, 44100, 0.5), 44100);
        let notes = extractor().extract(&audio).unwrap();

        assert_eq!(notes.len(), 1, "notes: {:?}", notes);
        let note = notes[0];
        assert!((note.pitch_hz - 440.0).abs() < 3.0, "pitch {}", note.pitch_hz);
        assert!(note.onset_secs < 0.05);
        assert!((note.duration_secs - 1.0).abs() < 0.05);
        assert!(note.end_secs() <= audio.duration_secs() + 1e-6);
        assert!((note.amplitude - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_two_pitches_in_sequence() {
        let mut samples = tone(330.0, 0.5, 44100, 0.4);
        samples.extend(tone(440.0, 0.5, 44100, 0.4));
        let audio = AudioBuffer::new(samples, 44100);
        let notes = extractor().extract(&audio).unwrap();

        assert_eq!(notes.len(), 2, "notes: {:?}", notes);
        assert!((notes[0].midi_pitch() - 64.0).abs() < 0.3);
        assert!((notes[1].midi_pitch() - 69.0).abs() < 0.3);
        assert!(notes[0].onset_secs < notes[1].onset_secs);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut samples = tone(220.0, 0.4, 16000, 0.3);
        samples.extend(vec![0.0; 4000]);
        samples.extend(tone(294.0, 0.4, 16000, 0.3));
        let audio = AudioBuffer::new(samples, 16000);

        let parallel = extractor().extract(&audio).unwrap();
        let sequential = PitchExtractor::new(ExtractorConfig {
            parallel: false,
            ..ExtractorConfig::default()
        })
        .unwrap()
        .extract(&audio)
        .unwrap();

        assert_eq!(parallel, sequential);
        assert!(!parallel.is_empty());
        assert!(parallel.windows(2).all(|w| w[0].onset_secs < w[1].onset_secs));
    }
}

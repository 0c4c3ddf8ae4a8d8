//! Energy gating and note segmentation over analysed windows

use std::f32::consts::SQRT_2;

use super::WindowAnalysis;
use crate::note::{hz_to_midi, midi_to_hz, NoteEvent};

/// Root-mean-square level of a frame (0.0 for an empty frame)
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// Rolling estimate of the background level
///
/// The floor follows an exponential moving average of the windows that do
/// not carry a voiced note, and never drops below `min_floor`.
#[derive(Debug, Clone)]
pub struct NoiseFloor {
    floor: f32,
    min_floor: f32,
    ratio: f32,
    adapt_rate: f32,
    silence_threshold: f32,
}

impl NoiseFloor {
    pub fn new(min_floor: f32, ratio: f32, adapt_rate: f32, silence_threshold: f32) -> Self {
        Self {
            floor: min_floor,
            min_floor,
            ratio,
            adapt_rate,
            silence_threshold,
        }
    }

    pub fn level(&self) -> f32 {
        self.floor
    }

    /// Whether a window at `rms` stands out from silence and the floor
    pub fn is_active(&self, rms: f32) -> bool {
        rms >= self.silence_threshold && rms > self.floor * self.ratio
    }

    /// Fold a background window into the floor
    pub fn update(&mut self, rms: f32) {
        self.floor = (self.floor + self.adapt_rate * (rms - self.floor)).max(self.min_floor);
    }
}

/// Thresholds for turning windows into notes
#[derive(Debug, Clone)]
pub struct SegmenterParams {
    pub sample_rate: u32,
    pub silence_threshold: f32,
    pub onset_ratio: f32,
    pub min_noise_floor: f32,
    pub noise_adapt_rate: f32,
    pub pitch_tolerance_semitones: f32,
    pub min_note_secs: f32,
}

struct OpenNote {
    start_sample: usize,
    end_sample: usize,
    midis: Vec<f32>,
    last_midi: f32,
    peak_rms: f32,
}

impl OpenNote {
    fn new(window: &WindowAnalysis, midi: f32) -> Self {
        Self {
            start_sample: window.start,
            end_sample: window.start + window.len,
            midis: vec![midi],
            last_midi: midi,
            peak_rms: window.rms,
        }
    }

    fn extend(&mut self, window: &WindowAnalysis, midi: f32) {
        self.end_sample = window.start + window.len;
        self.midis.push(midi);
        self.last_midi = midi;
        self.peak_rms = self.peak_rms.max(window.rms);
    }

    fn into_event(mut self, sample_rate: u32) -> NoteEvent {
        self.midis.sort_by(f32::total_cmp);
        let mid = self.midis.len() / 2;
        let median = if self.midis.len() % 2 == 0 {
            (self.midis[mid - 1] + self.midis[mid]) / 2.0
        } else {
            self.midis[mid]
        };

        let sr = sample_rate as f32;
        NoteEvent {
            pitch_hz: midi_to_hz(median),
            onset_secs: self.start_sample as f32 / sr,
            duration_secs: (self.end_sample - self.start_sample) as f32 / sr,
            amplitude: (self.peak_rms * SQRT_2).min(1.0),
        }
    }
}

/// Group consecutive voiced windows into notes
///
/// A note starts on the first active, voiced window after silence or an
/// unvoiced window, and also whenever the pitch moves more than the
/// tolerance away from the previous window. A note split off by a pitch
/// change ends where its successor begins.
pub fn segment_notes(windows: &[WindowAnalysis], params: &SegmenterParams) -> Vec<NoteEvent> {
    let mut floor = NoiseFloor::new(
        params.min_noise_floor,
        params.onset_ratio,
        params.noise_adapt_rate,
        params.silence_threshold,
    );
    let mut notes = Vec::new();
    let mut current: Option<OpenNote> = None;

    let finish = |note: OpenNote, notes: &mut Vec<NoteEvent>| {
        let event = note.into_event(params.sample_rate);
        if event.duration_secs >= params.min_note_secs {
            notes.push(event);
        } else {
            log::trace!(
                "dropping {:.3}s blip at {:.3}s",
                event.duration_secs,
                event.onset_secs
            );
        }
    };

    for window in windows {
        let pitch = window.pitch.filter(|_| floor.is_active(window.rms));
        let Some(estimate) = pitch else {
            floor.update(window.rms);
            if let Some(note) = current.take() {
                finish(note, &mut notes);
            }
            continue;
        };

        let midi = hz_to_midi(estimate.frequency_hz);
        match current.as_mut() {
            Some(note) if (midi - note.last_midi).abs() <= params.pitch_tolerance_semitones => {
                note.extend(window, midi);
                continue;
            }
            _ => {}
        }

        if let Some(mut previous) = current.take() {
            previous.end_sample = previous.end_sample.min(window.start);
            finish(previous, &mut notes);
        }
        current = Some(OpenNote::new(window, midi));
    }

    if let Some(note) = current.take() {
        finish(note, &mut notes);
    }

    notes
}

//! Text transcription of quantized notes
//!
//! Format:
//! ```text
//! @tempo 120          # beats per minute
//! @grid 4             # grid steps per beat
//! +<steps>| <event1>, <event2>  # comments
//! ```
//!
//! Events:
//! - Key down: <octave><note><accidental>d[:amplitude]  (e.g., 4c#d, 4ad:0.75)
//! - Key up:   <octave><note><accidental>u              (e.g., 4c#u, 4au)
//!
//! Notes:
//! - Pitch classes: c, d, e, f, g, a, b with `#` sharps or `b` flats
//! - Octaves: -1 to 9 (C4 is MIDI 60)
//! - `+<steps>` counts grid steps since the previous line

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::note::QuantizedNoteEvent;

/// Amplitude of a key-down event written without one
pub const DEFAULT_AMPLITUDE: f32 = 0.8;
pub const DEFAULT_TEMPO_BPM: f32 = 120.0;
pub const DEFAULT_SUBDIVISION: u32 = 4;

/// Pitch classes, spelled with sharps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitone above C (C=0, C#=1, D=2, ...)
    pub fn semitone(&self) -> u8 {
        *self as u8
    }

    /// Pitch class of a semitone count, wrapping at the octave
    pub fn from_semitone(semitone: u8) -> Self {
        Self::ALL[(semitone % 12) as usize]
    }

    /// Lowercase spelling used in transcriptions
    pub fn as_str(&self) -> &'static str {
        match self {
            PitchClass::C => "c",
            PitchClass::CSharp => "c#",
            PitchClass::D => "d",
            PitchClass::DSharp => "d#",
            PitchClass::E => "e",
            PitchClass::F => "f",
            PitchClass::FSharp => "f#",
            PitchClass::G => "g",
            PitchClass::GSharp => "g#",
            PitchClass::A => "a",
            PitchClass::ASharp => "a#",
            PitchClass::B => "b",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for PitchClass {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" | "b#" => Ok(PitchClass::C),
            "c#" | "db" => Ok(PitchClass::CSharp),
            "d" => Ok(PitchClass::D),
            "d#" | "eb" => Ok(PitchClass::DSharp),
            "e" | "fb" => Ok(PitchClass::E),
            "f" | "e#" => Ok(PitchClass::F),
            "f#" | "gb" => Ok(PitchClass::FSharp),
            "g" => Ok(PitchClass::G),
            "g#" | "ab" => Ok(PitchClass::GSharp),
            "a" => Ok(PitchClass::A),
            "a#" | "bb" => Ok(PitchClass::ASharp),
            "b" | "cb" => Ok(PitchClass::B),
            _ => Err(NotationError::InvalidPitchClass(s.to_string())),
        }
    }
}

/// A note in scientific pitch notation (A4 = MIDI 69)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteName {
    pub octave: i8,
    pub pitch_class: PitchClass,
}

impl NoteName {
    pub fn from_midi(midi: u8) -> Self {
        Self {
            octave: (midi / 12) as i8 - 1,
            pitch_class: PitchClass::from_semitone(midi),
        }
    }

    /// MIDI number, or `None` outside 0..=127
    pub fn midi(&self) -> Option<u8> {
        let midi = (self.octave as i32 + 1) * 12 + self.pitch_class.semitone() as i32;
        u8::try_from(midi).ok().filter(|&m| m <= 127)
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

/// Direction of a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

/// A single key event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEvent {
    pub note: NoteName,
    pub direction: KeyDirection,
    /// Only key-down events carry an amplitude
    pub amplitude: Option<f32>,
}

/// A line from the transcription with its step delta
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvents {
    /// Grid steps since the previous line (absolute step for the first line)
    pub delta: usize,
    /// Events occurring at this step
    pub events: Vec<KeyEvent>,
}

/// A parsed transcription
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub tempo_bpm: f32,
    /// Grid steps per beat
    pub subdivision: u32,
    pub lines: Vec<TimedEvents>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotationError {
    #[error("invalid line: {0}")]
    InvalidLine(String),
    #[error("invalid step delta: {0}")]
    InvalidTimestep(String),
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("invalid pitch class: {0}")]
    InvalidPitchClass(String),
    #[error("invalid octave: {0}")]
    InvalidOctave(String),
    #[error("invalid direction: {0}")]
    InvalidDirection(String),
    #[error("invalid amplitude: {0}")]
    InvalidAmplitude(String),
    #[error("invalid directive: {0}")]
    InvalidDirective(String),
    #[error("note out of MIDI range: {0}")]
    NoteOutOfRange(String),
    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<NotationError>,
    },
}

/// Parse a single event string
/// Format: <octave><note><accidental><direction>[:amplitude]
/// Examples: 4c#d, 4au, -1bd:0.5
fn parse_event(s: &str) -> Result<KeyEvent, NotationError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(NotationError::InvalidEvent("empty event".to_string()));
    }

    let (body, amplitude) = match s.split_once(':') {
        Some((body, amp)) => {
            let amp = amp
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|a| (0.0..=1.0).contains(a))
                .ok_or_else(|| NotationError::InvalidAmplitude(amp.to_string()))?;
            (body.trim(), Some(amp))
        }
        None => (s, None),
    };

    // Last character must be 'd' (down) or 'u' (up)
    let Some(direction_char) = body.chars().last() else {
        return Err(NotationError::InvalidEvent(s.to_string()));
    };
    let direction = match direction_char {
        'd' => KeyDirection::Down,
        'u' => KeyDirection::Up,
        other => return Err(NotationError::InvalidDirection(other.to_string())),
    };
    if direction == KeyDirection::Up && amplitude.is_some() {
        return Err(NotationError::InvalidEvent(format!(
            "key-up event carries an amplitude: {}",
            s
        )));
    }
    let note_part = &body[..body.len() - 1];

    // Octave is an optional '-' followed by digits
    let split = note_part
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(note_part.len());
    let (octave_str, pitch_str) = note_part.split_at(split);
    let octave = octave_str
        .parse::<i8>()
        .ok()
        .filter(|o| (-1..=9).contains(o))
        .ok_or_else(|| NotationError::InvalidOctave(octave_str.to_string()))?;

    if pitch_str.is_empty() {
        return Err(NotationError::InvalidPitchClass("missing".to_string()));
    }
    let pitch_class = PitchClass::from_str(pitch_str)?;

    let note = NoteName {
        octave,
        pitch_class,
    };
    if note.midi().is_none() {
        return Err(NotationError::NoteOutOfRange(note.to_string()));
    }

    Ok(KeyEvent {
        note,
        direction,
        amplitude,
    })
}

/// Strip a trailing comment
///
/// A `#` is a sharp only when it follows an octave digit and a note letter,
/// as in `4c#d`; anywhere else it starts a comment.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let is_sharp = |i: usize| {
        i >= 2 && matches!(bytes[i - 1], b'a'..=b'g' | b'A'..=b'G') && bytes[i - 2].is_ascii_digit()
    };
    match (0..bytes.len()).find(|&i| bytes[i] == b'#' && !is_sharp(i)) {
        Some(start) => line[..start].trim(),
        None => line.trim(),
    }
}

/// Parse a line of the transcription format
/// Format: +<delta>| event1, event2, ...  # comment
pub fn parse_line(line: &str) -> Result<TimedEvents, NotationError> {
    let line = strip_comment(line);

    if line.is_empty() {
        return Ok(TimedEvents {
            delta: 0,
            events: vec![],
        });
    }

    let Some((step_part, events_part)) = line.split_once('|') else {
        return Err(NotationError::InvalidLine(
            "expected format: +<delta>| events".to_string(),
        ));
    };

    let step_part = step_part.trim();
    let delta = step_part
        .strip_prefix('+')
        .ok_or_else(|| NotationError::InvalidTimestep("step must start with +".to_string()))?
        .parse::<usize>()
        .map_err(|_| NotationError::InvalidTimestep(step_part.to_string()))?;

    let events = events_part
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_event)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TimedEvents { delta, events })
}

fn parse_directive(line: &str, transcription: &mut Transcription) -> Result<(), NotationError> {
    let invalid = || NotationError::InvalidDirective(line.to_string());
    let mut words = line.split_whitespace();
    let name = words.next().ok_or_else(invalid)?;
    let value = words.next().ok_or_else(invalid)?;
    if words.next().is_some() {
        return Err(invalid());
    }

    match name {
        "@tempo" => {
            transcription.tempo_bpm = value
                .parse::<f32>()
                .ok()
                .filter(|bpm| bpm.is_finite() && *bpm > 0.0)
                .ok_or_else(invalid)?;
        }
        "@grid" => {
            transcription.subdivision = value
                .parse::<u32>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(invalid)?;
        }
        _ => return Err(invalid()),
    }
    Ok(())
}

/// Parse full transcription text
///
/// Missing directives fall back to 120 BPM and four steps per beat.
pub fn parse_transcription(text: &str) -> Result<Transcription, NotationError> {
    let mut transcription = Transcription {
        tempo_bpm: DEFAULT_TEMPO_BPM,
        subdivision: DEFAULT_SUBDIVISION,
        lines: Vec::new(),
    };
    // Steps of lines without events carry over to the next line
    let mut pending_delta: usize = 0;
    let mut total_steps: usize = 0;

    for (number, raw) in text.lines().enumerate() {
        let at_line = |source: NotationError| NotationError::AtLine {
            line: number + 1,
            source: Box::new(source),
        };

        let line = strip_comment(raw);
        if line.is_empty() {
            continue;
        }
        if line.starts_with('@') {
            parse_directive(line, &mut transcription).map_err(at_line)?;
            continue;
        }

        let timed = parse_line(line).map_err(at_line)?;
        total_steps = total_steps.checked_add(timed.delta).ok_or_else(|| {
            at_line(NotationError::InvalidTimestep(format!(
                "+{} runs past the last representable step",
                timed.delta
            )))
        })?;
        pending_delta += timed.delta;
        if !timed.events.is_empty() {
            transcription.lines.push(TimedEvents {
                delta: pending_delta,
                events: timed.events,
            });
            pending_delta = 0;
        }
    }

    Ok(transcription)
}

impl Transcription {
    /// Seconds per grid step
    pub fn step_secs(&self) -> f32 {
        60.0 / self.tempo_bpm / self.subdivision as f32
    }

    /// Pair key-down and key-up events into notes, ordered by onset
    ///
    /// A key-down on a note that is already held is ignored, as is a key-up
    /// on a note that is not held. Notes still held at the end stop at the
    /// last step. Every note lasts at least one step.
    pub fn to_events(&self) -> Vec<QuantizedNoteEvent> {
        let step_secs = self.step_secs();
        let mut held: BTreeMap<u8, (usize, f32)> = BTreeMap::new();
        let mut notes: Vec<(usize, usize, u8, f32)> = Vec::new();
        let mut step: usize = 0;

        for timed in &self.lines {
            step = step.saturating_add(timed.delta);
            for event in &timed.events {
                // Range is checked when parsing
                let Some(midi) = event.note.midi() else {
                    continue;
                };
                match event.direction {
                    KeyDirection::Down => {
                        held.entry(midi)
                            .or_insert((step, event.amplitude.unwrap_or(DEFAULT_AMPLITUDE)));
                    }
                    KeyDirection::Up => {
                        if let Some((start, amplitude)) = held.remove(&midi) {
                            notes.push((start, step, midi, amplitude));
                        }
                    }
                }
            }
        }

        for (midi, (start, amplitude)) in held {
            notes.push((start, step, midi, amplitude));
        }

        notes.sort_by_key(|&(start, _, midi, _)| (start, midi));
        notes
            .into_iter()
            .map(|(start, end, midi_note, amplitude)| QuantizedNoteEvent {
                midi_note,
                onset_secs: start as f32 * step_secs,
                duration_secs: end.saturating_sub(start).max(1) as f32 * step_secs,
                amplitude,
            })
            .collect()
    }
}

/// Grid steps `[start, end)` of one note
#[derive(Debug, Clone, Copy)]
struct StepSpan {
    midi: u8,
    start: usize,
    end: usize,
    amplitude: f32,
}

/// Make notes of the same pitch disjoint
///
/// A note is cut where the next note of its pitch starts. Notes of one pitch
/// starting on the same step are merged into the longest and loudest.
fn separate_same_pitch(mut spans: Vec<StepSpan>) -> Vec<StepSpan> {
    spans.sort_by_key(|s| (s.midi, s.start, s.end));

    let mut out: Vec<StepSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match out.last_mut() {
            Some(prev) if prev.midi == span.midi && prev.start == span.start => {
                prev.end = prev.end.max(span.end);
                prev.amplitude = prev.amplitude.max(span.amplitude);
            }
            Some(prev) if prev.midi == span.midi && prev.end > span.start => {
                prev.end = span.start;
                out.push(span);
            }
            _ => out.push(span),
        }
    }
    out
}

/// Write quantized notes as a transcription
///
/// Onsets and durations are expressed in grid steps of
/// `60 / tempo_bpm / subdivision` seconds. Overlapping notes of the same
/// pitch cannot both be held, so the earlier one is released where the
/// later one starts.
pub fn write_transcription(events: &[QuantizedNoteEvent], tempo_bpm: f32, subdivision: u32) -> String {
    let step_secs = 60.0 / tempo_bpm / subdivision.max(1) as f32;

    let spans = events
        .iter()
        .map(|event| {
            let start = (event.onset_secs / step_secs).round().max(0.0) as usize;
            let steps = ((event.duration_secs / step_secs).round() as usize).max(1);
            StepSpan {
                midi: event.midi_note,
                start,
                end: start.saturating_add(steps),
                amplitude: event.amplitude.clamp(0.0, 1.0),
            }
        })
        .collect();

    // (step, key-ups before key-downs, midi, text)
    let mut keyed: Vec<(usize, u8, u8, String)> = Vec::with_capacity(events.len() * 2);
    for span in separate_same_pitch(spans) {
        let name = NoteName::from_midi(span.midi);
        let spelled = format!("{}{}", name.octave, name.pitch_class.as_str());

        keyed.push((
            span.start,
            1,
            span.midi,
            format!("{}d:{:.2}", spelled, span.amplitude),
        ));
        keyed.push((span.end, 0, span.midi, format!("{}u", spelled)));
    }
    keyed.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));

    let mut out = format!("@tempo {}\n@grid {}\n", tempo_bpm, subdivision);
    let mut last_step = 0;
    let mut idx = 0;
    while idx < keyed.len() {
        let step = keyed[idx].0;
        let group: Vec<&str> = keyed[idx..]
            .iter()
            .take_while(|k| k.0 == step)
            .map(|k| k.3.as_str())
            .collect();
        idx += group.len();

        out.push_str(&format!("+{}| {}\n", step - last_step, group.join(", ")));
        last_step = step;
    }
    out
}

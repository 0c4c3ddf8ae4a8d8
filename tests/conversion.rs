//! End-to-end conversions on synthesized voice signals

use std::f32::consts::PI;

use voxtrum::note::NoteEvent;
use voxtrum::pipeline::{
    parse_transcription, write_transcription, NoteQuantizer, PitchClass, Quantizer, QuantizerConfig, Scale,
};
use voxtrum::wav::{read_wav, write_wav_16bit};
use voxtrum::{AudioBuffer, ConversionConfig, ConvertError, Converter};

const SR: u32 = 44100;

/// A hummed note: sine with a few harmonics and short fades
fn hum(freq: f32, secs: f32, amp: f32) -> Vec<f32> {
    let len = (secs * SR as f32) as usize;
    let fade = (0.01 * SR as f32) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / SR as f32;
            let gain = (i.min(len - 1 - i) as f32 / fade as f32).min(1.0);
            let voice = (2.0 * PI * freq * t).sin()
                + 0.3 * (2.0 * PI * 2.0 * freq * t).sin()
                + 0.1 * (2.0 * PI * 3.0 * freq * t).sin();
            amp * gain * voice / 1.4
        })
        .collect()
}

fn silence(secs: f32) -> Vec<f32> {
    vec![0.0; (secs * SR as f32) as usize]
}

fn config(instrument: &str) -> ConversionConfig {
    ConversionConfig {
        instrument: instrument.to_string(),
        ..ConversionConfig::default()
    }
}

#[test]
fn test_silence_converts_to_nothing() {
    let converter = Converter::new(&config("piano")).unwrap();
    let result = converter
        .convert(&AudioBuffer::new(silence(1.0), SR))
        .unwrap();

    assert!(result.notes.is_empty());
    assert!(result.quantized.is_empty());
    assert!(result.audio.is_empty());
}

#[test]
fn test_single_a440_becomes_a4() {
    let tone: Vec<f32> = (0..SR)
        .map(|i| 0.5 * (2.0 * PI * 440.0 * i as f32 / SR as f32).sin())
        .collect();
    let converter = Converter::new(&config("piano")).unwrap();
    let result = converter.convert(&AudioBuffer::new(tone, SR)).unwrap();

    assert_eq!(result.notes.len(), 1);
    let note = result.notes[0];
    assert!((note.pitch_hz - 440.0).abs() < 3.0);
    assert!(note.onset_secs < 0.05);
    assert!((note.duration_secs - 1.0).abs() < 0.05);

    assert_eq!(result.quantized[0].midi_note, 69);
    assert!((result.audio.duration_secs() - 1.0).abs() < 0.5);
    assert!(result.audio.duration_secs() >= result.quantized[0].end_secs());
    assert_eq!(result.audio.sample_rate(), SR);
    assert!(result.audio.peak() > 0.05);
}

#[test]
fn test_unsupported_instrument_produces_no_buffer() {
    assert!(matches!(
        Converter::new(&config("didgeridoo")),
        Err(ConvertError::UnsupportedInstrument(_))
    ));
}

#[test]
fn test_melody_order_and_scale() {
    // C4 E4 G4 with gaps, sung slightly flat
    let mut samples = Vec::new();
    for freq in [259.0, 327.0, 388.0] {
        samples.extend(hum(freq, 0.4, 0.4));
        samples.extend(silence(0.1));
    }

    let scale = Scale::Major(PitchClass::C);
    let config = ConversionConfig {
        instrument: "strings".to_string(),
        quantizer: QuantizerConfig {
            bpm: Some(120.0),
            scale,
            ..QuantizerConfig::default()
        },
        ..ConversionConfig::default()
    };
    let result = Converter::new(&config)
        .unwrap()
        .convert(&AudioBuffer::new(samples, SR))
        .unwrap();

    assert_eq!(result.notes.len(), 3, "notes: {:?}", result.notes);
    assert_eq!(result.quantized.len(), result.notes.len());
    let pitches: Vec<u8> = result.quantized.iter().map(|q| q.midi_note).collect();
    assert_eq!(pitches, vec![60, 64, 67]);
    assert!(result.quantized.iter().all(|q| scale.contains(q.midi_note)));
    assert!(result
        .quantized
        .windows(2)
        .all(|w| w[0].onset_secs <= w[1].onset_secs));

    let last_end = result
        .quantized
        .iter()
        .map(|q| q.end_secs())
        .fold(0.0, f32::max);
    assert!(result.audio.duration_secs() >= last_end);
}

#[test]
fn test_conversion_is_deterministic() {
    let mut samples = hum(220.0, 0.3, 0.5);
    samples.extend(hum(247.0, 0.3, 0.5));
    let input = AudioBuffer::new(samples, SR);

    for instrument in ["piano", "strings", "guitar"] {
        let converter = Converter::new(&config(instrument)).unwrap();
        let first = converter.convert(&input).unwrap();
        let second = converter.convert(&input).unwrap();
        assert_eq!(first, second, "{} differs between runs", instrument);
    }
}

#[test]
fn test_wav_to_wav_through_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("hum.wav");
    let output_path = dir.path().join("guitar.wav");

    let mut samples = hum(330.0, 0.5, 0.5);
    samples.extend(silence(0.2));
    samples.extend(hum(440.0, 0.5, 0.5));
    write_wav_16bit(&input_path, &AudioBuffer::new(samples, SR)).unwrap();

    let converter = Converter::new(&config("guitar")).unwrap();
    let input = read_wav(&input_path).unwrap();
    let result = converter.convert(&input).unwrap();
    write_wav_16bit(&output_path, &result.audio).unwrap();

    let written = read_wav(&output_path).unwrap();
    assert_eq!(written.len(), result.audio.len());
    assert_eq!(written.sample_rate(), SR);

    // The transcript renders back to the same notes
    let text = write_transcription(&result.quantized, result.tempo_bpm, 4);
    let reparsed = parse_transcription(&text).unwrap().to_events();
    assert_eq!(reparsed.len(), result.quantized.len());
    for (a, b) in reparsed.iter().zip(&result.quantized) {
        assert_eq!(a.midi_note, b.midi_note);
        assert!((a.onset_secs - b.onset_secs).abs() < 1e-3);
    }

    let rerendered = converter.render(&reparsed, SR).unwrap();
    assert!(rerendered.duration_secs() >= reparsed.last().unwrap().end_secs());
}

#[test]
fn test_repeated_note_survives_transcript() {
    // Two A4s whose quantized spans overlap on a sixteenth grid
    let sung = |onset_secs: f32, duration_secs: f32| NoteEvent {
        pitch_hz: 440.0,
        onset_secs,
        duration_secs,
        amplitude: 0.5,
    };
    let quantizer = Quantizer::new(QuantizerConfig {
        bpm: Some(120.0),
        ..QuantizerConfig::default()
    })
    .unwrap();
    let quantized = quantizer.quantize(&[sung(0.19, 0.19), sung(0.40, 0.30)]).unwrap();
    assert!(quantized[1].onset_secs < quantized[0].end_secs());

    let text = write_transcription(&quantized, 120.0, 4);
    let reparsed = parse_transcription(&text).unwrap().to_events();
    assert_eq!(reparsed.len(), 2, "{}", text);
    assert!(reparsed.iter().all(|n| n.midi_note == 69));
    assert!((reparsed[0].onset_secs - quantized[0].onset_secs).abs() < 1e-5);
    assert!((reparsed[1].onset_secs - quantized[1].onset_secs).abs() < 1e-5);
    assert!(reparsed[0].end_secs() <= reparsed[1].onset_secs + 1e-5);
}

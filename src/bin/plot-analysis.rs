//! Plot the pitch track of a recording with its detected and quantized notes
//!
//! Usage: plot-analysis <input.wav> <output.svg> [config.toml]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use plotters::prelude::*;
use voxtrum::analysis::PitchExtractor;
use voxtrum::note::hz_to_midi;
use voxtrum::pipeline::{NoteExtractor, NoteQuantizer, Quantizer};
use voxtrum::wav::read_wav;
use voxtrum::ConversionConfig;

struct Args {
    input: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
}

fn print_usage() {
    eprintln!("Usage: plot-analysis <input.wav> <output.svg> [config.toml]");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  plot-analysis hum.wav hum.svg");
    eprintln!("  plot-analysis hum.wav hum.svg voxtrum.toml  # custom extractor settings");
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    if !(3..=4).contains(&args.len()) {
        print_usage();
        bail!("invalid number of arguments");
    }
    Ok(Args {
        input: PathBuf::from(&args[1]),
        output: PathBuf::from(&args[2]),
        config: args.get(3).map(PathBuf::from),
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => ConversionConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ConversionConfig::default(),
    };
    let audio = read_wav(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let extractor = PitchExtractor::new(config.extractor.clone())?;
    let quantizer = Quantizer::new(config.quantizer.clone())?;
    let windows = extractor.analyze_windows(&audio)?;
    let notes = extractor.extract(&audio)?;
    let tempo_bpm = quantizer.tempo_bpm(&notes);
    let quantized = quantizer.quantize_at(&notes, tempo_bpm)?;
    println!(
        "{} windows, {} notes at {:.1} BPM",
        windows.len(),
        notes.len(),
        tempo_bpm
    );

    let track: Vec<(f32, f32)> = windows
        .iter()
        .filter_map(|w| {
            w.pitch
                .map(|p| (w.center_secs(audio.sample_rate()), hz_to_midi(p.frequency_hz)))
        })
        .collect();

    let (lo, hi) = track
        .iter()
        .map(|&(_, m)| m)
        .chain(quantized.iter().map(|q| q.midi_note as f32))
        .fold((f32::MAX, f32::MIN), |(lo, hi), m| (lo.min(m), hi.max(m)));
    let (lo, hi) = if lo <= hi { (lo - 2.0, hi + 2.0) } else { (48.0, 84.0) };
    let end = audio.duration_secs().max(0.01);

    let root = SVGBackend::new(&args.output, (1000, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let title = format!("{}: {} notes", args.input.display(), notes.len());
    let mut chart = ChartBuilder::on(&root)
        .caption(&title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f32..end, lo..hi)?;

    chart
        .configure_mesh()
        .x_desc("Time (s)")
        .y_desc("MIDI pitch")
        .x_labels(10)
        .y_labels(12)
        .draw()?;

    // Raw per-window pitch estimates
    chart.draw_series(
        track
            .iter()
            .map(|&(t, m)| Circle::new((t, m), 2, BLUE.filled())),
    )?;

    // Detected notes at their median pitch
    for note in &notes {
        let midi = note.midi_pitch();
        chart.draw_series(LineSeries::new(
            [(note.onset_secs, midi), (note.end_secs(), midi)],
            RED.stroke_width(2),
        ))?;
    }

    // Quantized notes
    for note in &quantized {
        let midi = note.midi_note as f32;
        chart.draw_series(LineSeries::new(
            [(note.onset_secs, midi), (note.end_secs(), midi)],
            GREEN.stroke_width(4),
        ))?;
    }

    root.present()?;
    println!("Output: {}", args.output.display());
    Ok(())
}

//! Command-line front end
//!
//! Usage:
//!   voxtrum convert <input.wav> <output.wav> [-i piano] [--bpm 120] [--scale major:c]
//!   voxtrum transcribe <input.wav> [-o notes.txt]
//!   voxtrum render <notes.txt> <output.wav> [-i strings]
//!   voxtrum instruments

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use voxtrum::pipeline::{parse_transcription, write_transcription, Scale};
use voxtrum::wav::{read_wav, write_wav_16bit};
use voxtrum::{ConversionConfig, Converter};

#[derive(Parser)]
#[command(name = "voxtrum", version, about = "Turn a hummed melody into an instrument performance")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a voice recording into an instrument recording
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        options: ConvertOptions,
        /// Also write the quantized notes as a transcription
        #[arg(long)]
        transcript: Option<PathBuf>,
    },
    /// Write the quantized notes of a voice recording as a transcription
    Transcribe {
        input: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        options: ConvertOptions,
    },
    /// Play a transcription with an instrument
    Render {
        notes: PathBuf,
        output: PathBuf,
        #[arg(short, long)]
        instrument: Option<String>,
        #[arg(long)]
        sample_rate: Option<u32>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the available instruments
    Instruments {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ConvertOptions {
    /// Instrument name (piano, strings, guitar or a configured profile)
    #[arg(short, long)]
    instrument: Option<String>,
    /// Fixed tempo; estimated from the melody when omitted
    #[arg(long)]
    bpm: Option<f32>,
    /// Scale to snap to, e.g. chromatic, major:g, minor:a, pentatonic:c
    #[arg(long)]
    scale: Option<Scale>,
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<ConversionConfig> {
    match path {
        Some(path) => ConversionConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(ConversionConfig::default()),
    }
}

impl ConvertOptions {
    /// File settings with command-line flags applied on top
    fn config(&self) -> Result<ConversionConfig> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(instrument) = &self.instrument {
            config.instrument = instrument.clone();
        }
        if let Some(bpm) = self.bpm {
            config.quantizer.bpm = Some(bpm);
        }
        if let Some(scale) = self.scale {
            config.quantizer.scale = scale;
        }
        Ok(config)
    }
}

fn convert(input: &Path, output: &Path, options: &ConvertOptions, transcript: Option<&Path>) -> Result<()> {
    let config = options.config()?;
    let converter = Converter::new(&config)?;

    let audio = read_wav(input).with_context(|| format!("failed to read {}", input.display()))?;
    let result = converter.convert(&audio)?;

    write_wav_16bit(output, &result.audio)
        .with_context(|| format!("failed to write {}", output.display()))?;
    if let Some(path) = transcript {
        let text = write_transcription(&result.quantized, result.tempo_bpm, config.quantizer.subdivision);
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    }

    println!(
        "{} notes at {:.1} BPM -> {} ({:.2}s, {})",
        result.quantized.len(),
        result.tempo_bpm,
        output.display(),
        result.audio.duration_secs(),
        converter.instrument().name
    );
    Ok(())
}

fn transcribe(input: &Path, output: Option<&Path>, options: &ConvertOptions) -> Result<()> {
    let config = options.config()?;
    let converter = Converter::new(&config)?;

    let audio = read_wav(input).with_context(|| format!("failed to read {}", input.display()))?;
    let (_, quantized, tempo_bpm) = converter.transcribe(&audio)?;
    let text = write_transcription(&quantized, tempo_bpm, config.quantizer.subdivision);

    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("wrote {} notes to {}", quantized.len(), path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn render(
    notes: &Path,
    output: &Path,
    instrument: Option<String>,
    sample_rate: Option<u32>,
    config: Option<&Path>,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(instrument) = instrument {
        config.instrument = instrument;
    }
    if sample_rate.is_some() {
        config.synth.sample_rate = sample_rate;
    }
    let converter = Converter::new(&config)?;

    let text = fs::read_to_string(notes).with_context(|| format!("failed to read {}", notes.display()))?;
    let transcription =
        parse_transcription(&text).with_context(|| format!("failed to parse {}", notes.display()))?;
    let events = transcription.to_events();

    let audio = converter.render(&events, voxtrum::pipeline::synthesizer::DEFAULT_SAMPLE_RATE)?;
    write_wav_16bit(output, &audio).with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "{} notes -> {} ({:.2}s, {})",
        events.len(),
        output.display(),
        audio.duration_secs(),
        converter.instrument().name
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Convert {
            input,
            output,
            options,
            transcript,
        } => convert(&input, &output, &options, transcript.as_deref()),
        Command::Transcribe {
            input,
            output,
            options,
        } => transcribe(&input, output.as_deref(), &options),
        Command::Render {
            notes,
            output,
            instrument,
            sample_rate,
            config,
        } => render(&notes, &output, instrument, sample_rate, config.as_deref()),
        Command::Instruments { config } => {
            let config = load_config(config.as_deref())?;
            for name in config.registry()?.names() {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

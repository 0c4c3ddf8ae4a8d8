//! WAV file reading and writing
//!
//! Input files may be integer or float PCM with any channel count; they are
//! downmixed to mono on load. Output is always mono 16-bit PCM.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::audio::AudioBuffer;
use crate::error::Result;

/// Read a WAV file into a mono buffer
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    log::debug!(
        "read {} samples ({} channels, {} Hz, {:?})",
        interleaved.len(),
        spec.channels,
        spec.sample_rate,
        spec.sample_format
    );

    AudioBuffer::from_interleaved(&interleaved, spec.channels, spec.sample_rate)
}

/// Write a buffer as a mono 16-bit PCM WAV file
///
/// Samples are clamped to [-1.0, 1.0]; -1.0 maps to `i16::MIN`.
pub fn write_wav_16bit<P: AsRef<Path>>(path: P, audio: &AudioBuffer) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &s in audio.samples() {
        writer.write_sample(to_i16(s))?;
    }
    writer.finalize()?;
    Ok(())
}

fn to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped >= 0.0 {
        (clamped * i16::MAX as f32) as i16
    } else {
        (clamped * -(i16::MIN as f32)) as i16
    }
}

//! Canonical-form audio handling for transcription.
//!
//! The speech-to-text service expects mono 16-bit PCM at 16 kHz. Clients may
//! send either raw PCM16 frames or a complete RIFF/WAV clip; both are
//! conformed to the canonical form on disk before upload.

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;

/// Whisper-optimal sample rate.
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

fn canonical_spec() -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate: CANONICAL_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write decoded client audio to `path` as canonical WAV.
///
/// Raw (headerless) payloads are assumed to already be mono PCM16 at 16 kHz,
/// matching what the browser capture pipeline produces; RIFF payloads are
/// decoded, downmixed, and resampled.
pub fn conform_to_wav(bytes: &[u8], path: &Path) -> Result<()> {
    if bytes.is_empty() {
        bail!("Empty audio payload");
    }

    let samples = if bytes.starts_with(b"RIFF") {
        decode_riff(bytes)?
    } else {
        raw_pcm16_to_mono(bytes)
    };

    write_wav(path, &samples)
}

/// Decode a RIFF/WAV clip into mono f32 samples at the canonical rate.
fn decode_riff(bytes: &[u8]) -> Result<Vec<f32>> {
    let mut reader =
        WavReader::new(Cursor::new(bytes)).context("Failed to parse WAV container")?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<std::result::Result<_, _>>()
            .context("Failed to read 16-bit samples")?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / i32::MAX as f32))
            .collect::<std::result::Result<_, _>>()
            .context("Failed to read 32-bit samples")?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("Failed to read float samples")?,
        (format, bits) => bail!("Unsupported WAV format: {:?} {} bits", format, bits),
    };

    let mono = downmix(&interleaved, spec.channels);
    Ok(resample(&mono, spec.sample_rate, CANONICAL_SAMPLE_RATE))
}

fn raw_pcm16_to_mono(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect()
}

/// Average interleaved channels into a single mono stream.
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample audio from one sample rate to another using linear interpolation.
/// Suitable for speech audio where perfect quality isn't critical.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio).ceil() as usize;
    let mut resampled = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f64;

        let sample = if src_idx + 1 < samples.len() {
            samples[src_idx] as f64 * (1.0 - frac) + samples[src_idx + 1] as f64 * frac
        } else if src_idx < samples.len() {
            samples[src_idx] as f64
        } else {
            0.0
        };

        resampled.push(sample as f32);
    }

    resampled
}

fn write_wav(path: &Path, samples: &[f32]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create recordings directory")?;
    }

    let mut writer =
        WavWriter::create(path, canonical_spec()).context("Failed to create WAV file")?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;

    Ok(())
}

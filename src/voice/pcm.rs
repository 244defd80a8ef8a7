//! PCM16 little-endian conversion and WAV export

use std::path::Path;
use std::sync::Arc;

use crate::{Error, Result};

/// Convert f32 samples in [-1.0, 1.0] to 16-bit little-endian PCM
#[must_use]
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&to_i16(sample).to_le_bytes());
    }
    bytes
}

/// Convert 16-bit little-endian PCM to f32 samples
///
/// # Errors
///
/// Returns `Decode` if the byte count is odd
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "pcm16 payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}

/// Decode an inbound agent chunk ready for scheduling
///
/// # Errors
///
/// Returns `Decode` for empty, odd-length or rate-less payloads
pub fn decode_chunk(bytes: &[u8], sample_rate: u32) -> Result<Arc<[f32]>> {
    if sample_rate == 0 {
        return Err(Error::Decode("chunk has zero sample rate".to_string()));
    }
    if bytes.is_empty() {
        return Err(Error::Decode("empty audio chunk".to_string()));
    }
    Ok(decode_pcm16(bytes)?.into())
}

#[allow(clippy::cast_possible_truncation)]
fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Encode samples as a mono 16-bit WAV
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(sample_rate))
            .map_err(|e| Error::Audio(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(to_i16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Write samples to a mono 16-bit WAV file
///
/// # Errors
///
/// Returns error if the file cannot be written
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let bytes = samples_to_wav(samples, sample_rate)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

const fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

//! PCM16 frame codec and resampling helpers.
//!
//! Captured audio is `f32` in `[-1, 1]`; the wire carries little-endian
//! signed 16-bit PCM, base64 encoded. Scaling is by 32768 in both
//! directions so a sample survives a round trip within 1/32768.

use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree};

const PCM16_SCALE: f32 = 32768.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("invalid base64 audio payload: {0}")]
    Base64(String),
    #[error("audio payload of {len} bytes is not a whole number of {channels}-channel PCM16 frames")]
    Misaligned { len: usize, channels: usize },
    #[error("channel count must be at least 1")]
    NoChannels,
}

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Encodes float samples as base64 PCM16.
///
/// Each sample is scaled by 32768 and truncated toward zero, saturating at
/// the i16 range. Empty input yields an empty string.
pub fn encode(pcm32: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(pcm32.to_binary())
}

/// Reverses only the text step of [`encode`], yielding packed PCM16 bytes.
pub fn decode(base64_fragment: &str) -> Result<Vec<u8>, DecodeError> {
    base64::engine::general_purpose::STANDARD
        .decode(base64_fragment)
        .map_err(|e| DecodeError::Base64(e.to_string()))
}

/// Reinterprets packed little-endian PCM16 as normalized floats, one vector per channel.
pub fn bytes_to_samples(bytes: &[u8], channel_count: usize) -> Result<Vec<Vec<f32>>, DecodeError> {
    if channel_count == 0 {
        return Err(DecodeError::NoChannels);
    }
    if bytes.len() % (2 * channel_count) != 0 {
        return Err(DecodeError::Misaligned {
            len: bytes.len(),
            channels: channel_count,
        });
    }

    let frame_count = bytes.len() / (2 * channel_count);
    let mut channels = vec![Vec::with_capacity(frame_count); channel_count];
    for (i, chunk) in bytes.chunks_exact(2).enumerate() {
        let v = i16::from_le_bytes([chunk[0], chunk[1]]);
        channels[i % channel_count].push(v as f32 / PCM16_SCALE);
    }
    Ok(channels)
}

/// Decodes a base64 PCM16 fragment straight to mono floats.
pub fn decode_mono(base64_fragment: &str) -> Result<Vec<f32>, DecodeError> {
    let bytes = decode(base64_fragment)?;
    let mut channels = bytes_to_samples(&bytes, 1)?;
    Ok(channels.pop().unwrap_or_default())
}

/// Averages interleaved frames down to one channel.
pub fn downmix(interleaved: &[f32], channel_count: usize) -> Vec<f32> {
    if channel_count <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channel_count)
        .map(|frame| frame.iter().sum::<f32>() / channel_count as f32)
        .collect()
}

fn to_i16(sample: f32) -> i16 {
    // `as` truncates toward zero and saturates at the i16 bounds.
    (sample * PCM16_SCALE) as i16
}

/// A trait for converting audio sample types to a binary representation (Vec<u8>).
pub trait ToBinary {
    fn to_binary(&self) -> Vec<u8>;
}

impl ToBinary for [f32] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter()
            .flat_map(|&sample| to_i16(sample).to_le_bytes())
            .collect()
    }
}

//! Audio conversion at the HTTP boundary
//!
//! Models consume and produce mono `f32` samples. Requests carry WAV bytes;
//! responses carry WAV or raw 16-bit PCM. Conversion happens outside the
//! arbiter so the lock only covers model invocation.

use std::io::Cursor;

use anyhow::{anyhow, Result};

use crate::error::GatewayError;

/// Mono audio samples in [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Parse WAV bytes into a mono buffer. `field` names the request field for
/// the validation error.
pub fn decode_wav(field: &str, wav_bytes: &[u8]) -> crate::error::Result<AudioBuffer> {
    let reader = hound::WavReader::new(Cursor::new(wav_bytes))
        .map_err(|e| GatewayError::validation(field, format!("not a valid WAV file: {}", e)))?;

    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(GatewayError::validation(field, "WAV sample rate is 0"));
    }
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample.max(1) as u32;
            let max_val = if bits > 1 {
                ((1i64 << (bits - 1)) - 1) as f32
            } else {
                1.0
            };
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_val))
                .collect::<std::result::Result<_, _>>()
        }
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect(),
    }
    .map_err(|e| GatewayError::validation(field, format!("corrupt WAV samples: {}", e)))?;

    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .map(|s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 })
        .collect();

    Ok(AudioBuffer::new(spec.sample_rate, samples))
}

/// Encode a buffer as 16-bit mono WAV
pub fn encode_wav(audio: &AudioBuffer) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| anyhow!("failed to create WAV writer: {}", e))?;
        for sample in &audio.samples {
            writer
                .write_sample(to_i16(*sample))
                .map_err(|e| anyhow!("failed to write WAV sample: {}", e))?;
        }
        writer
            .finalize()
            .map_err(|e| anyhow!("failed to finalize WAV: {}", e))?;
    }
    Ok(cursor.into_inner())
}

/// Encode a buffer as raw little-endian 16-bit PCM
pub fn encode_pcm16(audio: &AudioBuffer) -> Vec<u8> {
    audio
        .samples
        .iter()
        .flat_map(|s| to_i16(*s).to_le_bytes())
        .collect()
}

fn to_i16(sample: f32) -> i16 {
    let clamped = if sample.is_finite() {
        sample.clamp(-1.0, 1.0)
    } else {
        0.0
    };
    (clamped * i16::MAX as f32).round() as i16
}

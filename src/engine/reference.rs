//! Reference CPU backend
//!
//! Validates the startup artifacts exactly like a real backend would
//! (checkpoint detection, token table) and serves every family with small
//! deterministic signal-processing models. Useful for smoke-testing a
//! deployment without the heavyweight weights resident on a device.

use std::f32::consts::{PI, SQRT_2};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use super::capability::{
    ChatTurn, Codec, Conversational, Latent, SynthesisInput, Synthesizer, Transcriber, Transcript,
};
use super::resources::{LoadSpec, ModelLoader};
use crate::audio::AudioBuffer;
use crate::config::{DeviceConfig, GenerationConfig};
use crate::loader::detect_checkpoint;
use crate::tokenizer::TokenTable;

/// Latent frames per second
const FRAME_RATE: u32 = 21;
/// Sample rate of generated audio
const OUTPUT_SAMPLE_RATE: u32 = 44_100;
/// Levels per codebook
const CODEBOOK_SIZE: u32 = 1024;
/// Highest pitch the codec represents
const MAX_PITCH_HZ: f32 = 4000.0;
/// Loudness range of the codec in dB
const DYNAMIC_RANGE_DB: f32 = 80.0;

/// Loader for the reference backend
#[derive(Debug, Default)]
pub struct ReferenceLoader;

impl ReferenceLoader {
    pub fn new() -> Self {
        Self
    }

    fn check_artifacts(&self, spec: &LoadSpec) -> Result<()> {
        if spec.device.device_type() != "cpu" {
            tracing::warn!(
                "Reference backend runs on cpu; ignoring {} for {}",
                spec.device,
                spec.family
            );
        }
        let source = detect_checkpoint(&spec.checkpoint)?;
        tracing::debug!(
            "{} checkpoint: {} ({}, {:.1} MB)",
            spec.family,
            source.weights_path.display(),
            source.format,
            source.size_bytes as f64 / (1024.0 * 1024.0)
        );
        Ok(())
    }

    fn token_table(&self, spec: &LoadSpec) -> Result<Arc<TokenTable>> {
        let path = spec
            .tokenizer
            .as_ref()
            .ok_or_else(|| anyhow!("{} needs a token table", spec.family))?;
        let table = TokenTable::from_file(path)?;
        tracing::debug!("Token table: {} tokens", table.vocab_size());
        Ok(Arc::new(table))
    }
}

impl ModelLoader for ReferenceLoader {
    fn device(&self, _requested: &DeviceConfig) -> DeviceConfig {
        DeviceConfig::Simple("cpu".to_string())
    }

    fn load_codec(&self, spec: &LoadSpec) -> Result<Arc<dyn Codec>> {
        self.check_artifacts(spec)?;
        match spec.config_name.as_deref() {
            Some("firefly_gan_vq") | None => Ok(Arc::new(ReferenceCodec)),
            Some(other) => Err(anyhow!("unknown codec config: '{}'", other)),
        }
    }

    fn load_transcriber(&self, spec: &LoadSpec) -> Result<Arc<dyn Transcriber>> {
        self.check_artifacts(spec)?;
        Ok(Arc::new(ReferenceTranscriber))
    }

    fn load_synthesizer(&self, spec: &LoadSpec) -> Result<Arc<dyn Synthesizer>> {
        self.check_artifacts(spec)?;
        Ok(Arc::new(ReferenceSynthesizer {
            table: self.token_table(spec).context("loading synthesizer")?,
        }))
    }

    fn load_conversational(&self, spec: &LoadSpec) -> Result<Arc<dyn Conversational>> {
        self.check_artifacts(spec)?;
        Ok(Arc::new(ReferenceConversational {
            table: self.token_table(spec).context("loading conversational model")?,
        }))
    }
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// Pitch estimate from the zero-crossing rate
fn zero_crossing_pitch(frame: &[f32], sample_rate: u32) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 * sample_rate as f32 / (2.0 * frame.len() as f32)
}

fn quantize(value: f32, max: f32) -> u32 {
    let scaled = (value / max).clamp(0.0, 1.0) * (CODEBOOK_SIZE - 1) as f32;
    scaled.round() as u32
}

fn dequantize(code: u32, max: f32) -> f32 {
    code.min(CODEBOOK_SIZE - 1) as f32 / (CODEBOOK_SIZE - 1) as f32 * max
}

/// Appends a sine segment, keeping phase continuous across calls
fn push_tone(out: &mut Vec<f32>, phase: &mut f32, hz: f32, amplitude: f32, len: usize) {
    let step = 2.0 * PI * hz / OUTPUT_SAMPLE_RATE as f32;
    for _ in 0..len {
        out.push(amplitude * phase.sin());
        *phase = (*phase + step) % (2.0 * PI);
    }
}

/// Two-codebook loudness/pitch codec at 21 frames per second
struct ReferenceCodec;

impl Codec for ReferenceCodec {
    fn encode(&self, audio: &AudioBuffer) -> Result<Latent> {
        if audio.is_empty() {
            return Err(anyhow!("cannot encode empty audio"));
        }
        let hop = (audio.sample_rate / FRAME_RATE).max(1) as usize;
        let (levels, pitches): (Vec<u32>, Vec<u32>) = audio
            .samples
            .chunks(hop)
            .map(|frame| {
                let level_db = 20.0 * rms(frame).max(1e-6).log10() + DYNAMIC_RANGE_DB;
                (
                    quantize(level_db, DYNAMIC_RANGE_DB),
                    quantize(zero_crossing_pitch(frame, audio.sample_rate), MAX_PITCH_HZ),
                )
            })
            .unzip();
        Ok(Latent {
            codes: vec![levels, pitches],
        })
    }

    fn decode(&self, latent: &Latent) -> Result<AudioBuffer> {
        if latent.codebooks() != 2 {
            return Err(anyhow!(
                "expected 2 codebooks, got {}",
                latent.codebooks()
            ));
        }
        let hop = (OUTPUT_SAMPLE_RATE / FRAME_RATE) as usize;
        let mut samples = Vec::with_capacity(hop * latent.frames());
        let mut phase = 0.0;
        for (&level, &pitch) in latent.codes[0].iter().zip(&latent.codes[1]) {
            let level_db = dequantize(level, DYNAMIC_RANGE_DB) - DYNAMIC_RANGE_DB;
            // Codebook 0 stores RMS; a sine's peak is RMS * sqrt(2)
            let amplitude = 10f32.powf(level_db / 20.0) * SQRT_2;
            push_tone(&mut samples, &mut phase, dequantize(pitch, MAX_PITCH_HZ), amplitude, hop);
        }
        Ok(AudioBuffer::new(OUTPUT_SAMPLE_RATE, samples))
    }
}

/// Energy-based segmenter: reports the voiced spans it hears
struct ReferenceTranscriber;

impl Transcriber for ReferenceTranscriber {
    fn transcribe(&self, audio: &AudioBuffer, language: &str) -> Result<Transcript> {
        let window = (audio.sample_rate / 50).max(1) as usize; // 20 ms
        let secs = |idx: usize| (idx * window) as f32 / audio.sample_rate.max(1) as f32;

        let mut spans = Vec::new();
        let mut open: Option<usize> = None;
        for (idx, frame) in audio.samples.chunks(window).enumerate() {
            match (rms(frame) > 0.02, open) {
                (true, None) => open = Some(idx),
                (false, Some(start)) => {
                    spans.push((start, idx));
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(start) = open {
            spans.push((start, audio.samples.len().div_ceil(window)));
        }

        let text = spans
            .iter()
            .map(|(a, b)| format!("[{:.2}-{:.2}]", secs(*a), secs(*b)))
            .collect::<Vec<_>>()
            .join(" ");

        Ok(Transcript {
            text,
            duration_secs: audio.duration_secs(),
            language: if language == "auto" {
                "und".to_string()
            } else {
                language.to_string()
            },
        })
    }
}

/// Renders each token as a short tone
struct ReferenceSynthesizer {
    table: Arc<TokenTable>,
}

impl ReferenceSynthesizer {
    const TOKEN_SAMPLES: usize = (OUTPUT_SAMPLE_RATE as usize * 60) / 1000;
    const CHUNK_GAP_SAMPLES: usize = OUTPUT_SAMPLE_RATE as usize / 10;
    /// Token ceiling, also applied when the budget is unlimited
    const MAX_TOKENS: usize = 2048;
}

impl Synthesizer for ReferenceSynthesizer {
    fn synthesize(&self, input: &SynthesisInput) -> Result<AudioBuffer> {
        let options = &input.options;
        let base_hz = input
            .references
            .first()
            .map(|r| zero_crossing_pitch(&r.audio.samples, r.audio.sample_rate))
            .filter(|hz| *hz > 50.0)
            .unwrap_or(110.0)
            .min(1000.0);
        let amplitude = (0.3 * options.temperature / 0.7).min(0.9);

        let chars: Vec<char> = input.text.chars().collect();
        let mut budget = match options.max_new_tokens {
            0 => Self::MAX_TOKENS,
            n => n.min(Self::MAX_TOKENS),
        };
        let mut samples = Vec::new();
        let mut phase = 0.0;

        for chunk in chars.chunks(options.chunk_length.max(1)) {
            if budget == 0 {
                break;
            }
            let text: String = chunk.iter().collect();
            let ids = self.table.encode(&text);
            let take = ids.len().min(budget);
            budget -= take;
            for id in &ids[..take] {
                let hz = base_hz * (1.0 + (id % 24) as f32 / 12.0);
                push_tone(&mut samples, &mut phase, hz, amplitude, Self::TOKEN_SAMPLES);
            }
            samples.extend(std::iter::repeat(0.0).take(Self::CHUNK_GAP_SAMPLES));
        }

        if samples.is_empty() {
            return Err(anyhow!("nothing to synthesize"));
        }
        Ok(AudioBuffer::new(OUTPUT_SAMPLE_RATE, samples))
    }
}

/// Echoes the latest user turn, bounded by `max_new_tokens`
struct ReferenceConversational {
    table: Arc<TokenTable>,
}

impl Conversational for ReferenceConversational {
    fn converse(&self, history: &[ChatTurn], options: &GenerationConfig) -> Result<String> {
        let last_user = history
            .iter()
            .rev()
            .find(|turn| turn.role == "user")
            .ok_or_else(|| anyhow!("conversation has no user turn"))?;

        let mut ids = self.table.encode(&last_user.content);
        if options.max_new_tokens > 0 {
            ids.truncate(options.max_new_tokens);
        }
        self.table.decode(&ids)
    }
}

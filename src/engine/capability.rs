//! Capability traits, one per model family
//!
//! Each trait is the opaque, synchronous interface of a loaded model. Calls
//! may take seconds and must only be made while holding an `AccessToken`.

use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::config::GenerationConfig;

/// A model family the gateway can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Codec,
    Transcriber,
    Synthesizer,
    Conversational,
}

impl Family {
    /// Every family, in load order
    pub const ALL: [Family; 4] = [
        Family::Codec,
        Family::Synthesizer,
        Family::Conversational,
        Family::Transcriber,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Codec => "codec",
            Family::Transcriber => "transcriber",
            Family::Synthesizer => "synthesizer",
            Family::Conversational => "conversational",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete latent codes, indexed `codes[codebook][frame]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Latent {
    pub codes: Vec<Vec<u32>>,
}

impl Latent {
    pub fn codebooks(&self) -> usize {
        self.codes.len()
    }

    pub fn frames(&self) -> usize {
        self.codes.first().map(Vec::len).unwrap_or(0)
    }

    /// Non-empty and every codebook has the same number of frames
    pub fn is_rectangular(&self) -> bool {
        let frames = self.frames();
        frames > 0 && self.codes.iter().all(|row| row.len() == frames)
    }
}

/// Result of one transcription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub duration_secs: f32,
    pub language: String,
}

/// A voice reference: audio plus its transcript
#[derive(Debug, Clone)]
pub struct VoiceReference {
    pub audio: AudioBuffer,
    pub text: String,
}

/// Everything the synthesizer needs for one request
#[derive(Debug, Clone)]
pub struct SynthesisInput {
    pub text: String,
    pub references: Vec<VoiceReference>,
    pub options: GenerationConfig,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Audio ↔ latent codec
pub trait Codec: Send + Sync {
    fn encode(&self, audio: &AudioBuffer) -> Result<Latent>;
    fn decode(&self, latent: &Latent) -> Result<AudioBuffer>;
}

/// Speech-to-text
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &AudioBuffer, language: &str) -> Result<Transcript>;
}

/// Text-to-speech
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, input: &SynthesisInput) -> Result<AudioBuffer>;
}

/// Conversational language model
pub trait Conversational: Send + Sync {
    fn converse(&self, history: &[ChatTurn], options: &GenerationConfig) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latent_shape() {
        let latent = Latent {
            codes: vec![vec![1, 2, 3], vec![4, 5, 6]],
        };
        assert_eq!(latent.codebooks(), 2);
        assert_eq!(latent.frames(), 3);
        assert!(latent.is_rectangular());

        let ragged = Latent {
            codes: vec![vec![1, 2, 3], vec![4]],
        };
        assert!(!ragged.is_rectangular());
        assert!(!Latent { codes: vec![] }.is_rectangular());
        assert!(!Latent { codes: vec![vec![]] }.is_rectangular());
    }

    #[test]
    fn test_family_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Family::Conversational).unwrap(),
            "\"conversational\""
        );
    }
}

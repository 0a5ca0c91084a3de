//! Generation configuration settings

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Sampling options for synthesis and conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum number of tokens to generate (0 = model maximum)
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    /// Top-p nucleus sampling threshold
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Repetition penalty (1.0 = no penalty)
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,

    /// Temperature for sampling
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Characters of input text synthesized per iteration
    #[serde(default = "default_chunk_length")]
    pub chunk_length: usize,

    /// Random seed (None = random)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_max_new_tokens() -> usize {
    1024
}

fn default_top_p() -> f32 {
    0.7
}

fn default_repetition_penalty() -> f32 {
    1.2
}

fn default_temperature() -> f32 {
    0.7
}

fn default_chunk_length() -> usize {
    200
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            top_p: default_top_p(),
            repetition_penalty: default_repetition_penalty(),
            temperature: default_temperature(),
            chunk_length: default_chunk_length(),
            seed: None,
        }
    }
}

impl GenerationConfig {
    /// Check every option against its accepted range
    pub fn validate(&self) -> Result<()> {
        check_range("top_p", self.top_p, 0.1, 1.0)?;
        check_range("temperature", self.temperature, 0.1, 1.0)?;
        check_range("repetition_penalty", self.repetition_penalty, 0.9, 2.0)?;
        if !(100..=300).contains(&self.chunk_length) {
            return Err(GatewayError::validation(
                "chunk_length",
                format!("must be between 100 and 300, got {}", self.chunk_length),
            ));
        }
        Ok(())
    }

    /// Apply per-request overrides on top of these defaults
    pub fn with_overrides(&self, overrides: &SamplingOverrides) -> Self {
        Self {
            max_new_tokens: overrides.max_new_tokens.unwrap_or(self.max_new_tokens),
            top_p: overrides.top_p.unwrap_or(self.top_p),
            repetition_penalty: overrides
                .repetition_penalty
                .unwrap_or(self.repetition_penalty),
            temperature: overrides.temperature.unwrap_or(self.temperature),
            chunk_length: overrides.chunk_length.unwrap_or(self.chunk_length),
            seed: overrides.seed.or(self.seed),
        }
    }
}

/// Optional sampling fields a request may carry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingOverrides {
    #[serde(default)]
    pub max_new_tokens: Option<usize>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub chunk_length: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn check_range(field: &str, value: f32, min: f32, max: f32) -> Result<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(GatewayError::validation(
            field,
            format!("must be between {} and {}, got {}", min, max, value),
        ))
    }
}

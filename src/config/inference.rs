//! Inference configuration settings

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Device configuration for inference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceConfig {
    /// Simple device string (e.g., "cuda:0", "cpu", "mps")
    Simple(String),
    /// Detailed device configuration
    Detailed {
        /// Device type: "cuda", "mps", "cpu"
        device_type: String,
        /// Device ID (for multi-GPU)
        #[serde(default)]
        device_id: usize,
    },
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig::Simple("cuda".to_string())
    }
}

impl DeviceConfig {
    /// Get device type ("cuda", "mps" or "cpu")
    pub fn device_type(&self) -> &str {
        match self {
            DeviceConfig::Simple(s) => {
                if s.starts_with("cuda") {
                    "cuda"
                } else if s.starts_with("mps") {
                    "mps"
                } else {
                    "cpu"
                }
            }
            DeviceConfig::Detailed { device_type, .. } => device_type,
        }
    }

    /// Get device ID (for multi-GPU)
    pub fn device_id(&self) -> usize {
        match self {
            DeviceConfig::Simple(s) => s
                .split_once(':')
                .and_then(|(_, id)| id.parse().ok())
                .unwrap_or(0),
            DeviceConfig::Detailed { device_id, .. } => *device_id,
        }
    }

    /// Check if using CUDA
    pub fn is_cuda(&self) -> bool {
        self.device_type() == "cuda"
    }
}

impl fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device_type() {
            "cpu" => write!(f, "cpu"),
            other => write!(f, "{}:{}", other, self.device_id()),
        }
    }
}

/// Numeric precision the models are loaded in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    #[serde(rename = "f32")]
    Float32,
    #[serde(rename = "f16")]
    Float16,
    #[default]
    #[serde(rename = "bf16")]
    BFloat16,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Float32 => "f32",
            Precision::Float16 => "f16",
            Precision::BFloat16 => "bf16",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which model families the server loads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Codec + synthesizer
    #[default]
    Tts,
    /// Codec + synthesizer + conversational model
    Agent,
}

impl OperatingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Tts => "tts",
            OperatingMode::Agent => "agent",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperatingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "tts" => Ok(OperatingMode::Tts),
            "agent" => Ok(OperatingMode::Agent),
            other => Err(anyhow::anyhow!(
                "unknown mode: '{}' (expected 'tts' or 'agent')",
                other
            )),
        }
    }
}

/// Inference-specific configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Device configuration
    #[serde(default)]
    pub device: DeviceConfig,

    /// Numeric precision (f32, f16, bf16)
    #[serde(default)]
    pub precision: Precision,

    /// Compile the models ahead of serving instead of running eagerly
    #[serde(default)]
    pub compile: bool,

    /// Operating mode
    #[serde(default)]
    pub mode: OperatingMode,

    /// Load the (opt-in) transcription model
    #[serde(default)]
    pub load_asr_model: bool,
}

/// Checkpoint artifacts loaded at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Language model checkpoint (synthesizer and conversational families)
    #[serde(default = "default_llama_checkpoint")]
    pub llama_checkpoint_path: PathBuf,

    /// Codec checkpoint
    #[serde(default = "default_decoder_checkpoint")]
    pub decoder_checkpoint_path: PathBuf,

    /// Codec architecture name
    #[serde(default = "default_decoder_config_name")]
    pub decoder_config_name: String,

    /// Transcription checkpoint
    #[serde(default)]
    pub asr_checkpoint_path: Option<PathBuf>,

    /// Token table; defaults to `tokenizer.tiktoken` next to the language model
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,
}

fn default_llama_checkpoint() -> PathBuf {
    PathBuf::from("checkpoints/fish-speech-1.5")
}

fn default_decoder_checkpoint() -> PathBuf {
    PathBuf::from("checkpoints/fish-speech-1.5/firefly-gan-vq-fsq-8x1024-21hz-generator.pth")
}

fn default_decoder_config_name() -> String {
    "firefly_gan_vq".to_string()
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            llama_checkpoint_path: default_llama_checkpoint(),
            decoder_checkpoint_path: default_decoder_checkpoint(),
            decoder_config_name: default_decoder_config_name(),
            asr_checkpoint_path: None,
            tokenizer_path: None,
        }
    }
}

impl CheckpointConfig {
    /// Resolve the token table path
    pub fn tokenizer(&self) -> PathBuf {
        self.tokenizer_path.clone().unwrap_or_else(|| {
            let base = if self.llama_checkpoint_path.is_file() {
                self.llama_checkpoint_path
                    .parent()
                    .map(PathBuf::from)
                    .unwrap_or_default()
            } else {
                self.llama_checkpoint_path.clone()
            };
            base.join("tokenizer.tiktoken")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parsing() {
        let cuda = DeviceConfig::Simple("cuda:1".into());
        assert!(cuda.is_cuda());
        assert_eq!(cuda.device_id(), 1);
        assert_eq!(cuda.to_string(), "cuda:1");

        let cpu = DeviceConfig::Simple("cpu".into());
        assert_eq!(cpu.device_type(), "cpu");
        assert_eq!(cpu.to_string(), "cpu");

        let mps = DeviceConfig::Detailed {
            device_type: "mps".into(),
            device_id: 0,
        };
        assert_eq!(mps.to_string(), "mps:0");
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("tts".parse::<OperatingMode>().unwrap(), OperatingMode::Tts);
        assert_eq!(
            "agent".parse::<OperatingMode>().unwrap(),
            OperatingMode::Agent
        );
        assert!("chat".parse::<OperatingMode>().is_err());
    }

    #[test]
    fn test_tokenizer_path_fallback() {
        let config = CheckpointConfig::default();
        assert_eq!(
            config.tokenizer(),
            PathBuf::from("checkpoints/fish-speech-1.5/tokenizer.tiktoken")
        );

        let explicit = CheckpointConfig {
            tokenizer_path: Some(PathBuf::from("/srv/tok.tiktoken")),
            ..Default::default()
        };
        assert_eq!(explicit.tokenizer(), PathBuf::from("/srv/tok.tiktoken"));
    }
}

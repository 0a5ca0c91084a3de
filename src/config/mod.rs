//! Configuration system for voxgate
//!
//! `GatewayConfig` is parsed once at process start and shared read-only
//! (`Arc<GatewayConfig>`) by every component afterwards.

mod generation;
mod inference;
mod server;

pub use generation::{GenerationConfig, SamplingOverrides};
pub use inference::{CheckpointConfig, DeviceConfig, InferenceConfig, OperatingMode, Precision};
pub use server::ServerConfig;

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Parse a precision string into a `Precision`.
///
/// Accepts short and long forms: "f32"/"float32", "f16"/"float16"/"half",
/// "bf16"/"bfloat16".
pub fn parse_precision(s: &str) -> Result<Precision> {
    match s {
        "f32" | "float32" => Ok(Precision::Float32),
        "f16" | "float16" | "half" => Ok(Precision::Float16),
        "bf16" | "bfloat16" => Ok(Precision::BFloat16),
        other => Err(anyhow!("unknown precision: '{}'", other)),
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listener and request bounds
    #[serde(default)]
    pub server: ServerConfig,

    /// Device, precision, compilation and operating mode
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Artifacts loaded at startup
    #[serde(default)]
    pub checkpoints: CheckpointConfig,

    /// Default sampling options
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, picking the parser from the file extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(path),
            Some("yaml") | Some("yml") => Self::from_yaml(path),
            other => Err(anyhow!(
                "unsupported config format: {:?} (expected .yaml, .yml or .json)",
                other.unwrap_or("")
            )),
        };
        config.with_context(|| format!("failed to load config from {}", path.display()))
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> Result<()> {
        self.server.addr()?;
        if self.server.workers == 0 {
            return Err(anyhow!("workers must be at least 1"));
        }
        if self.server.max_body_size == 0 {
            return Err(anyhow!("max_body_size must be greater than 0"));
        }
        if self.server.max_latent_frames == 0 {
            return Err(anyhow!("max_latent_frames must be greater than 0"));
        }
        self.generation
            .validate()
            .map_err(|e| anyhow!("invalid generation defaults: {}", e))?;
        Ok(())
    }

    /// Get the operating mode
    pub fn mode(&self) -> OperatingMode {
        self.inference.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_yaml() {
        let yaml = r#"
server:
  listen: 0.0.0.0:9000
  workers: 4
  max_text_length: 1000

inference:
  device: cuda:1
  precision: f16
  compile: true
  mode: agent
  load_asr_model: true

checkpoints:
  llama_checkpoint_path: /models/agent
  decoder_checkpoint_path: /models/agent/codec.pth

generation:
  temperature: 0.5
"#;
        let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.server.max_text_length, 1000);
        assert_eq!(config.inference.device.device_id(), 1);
        assert_eq!(config.inference.precision, Precision::Float16);
        assert!(config.inference.compile);
        assert_eq!(config.mode(), OperatingMode::Agent);
        assert_eq!(config.checkpoints.decoder_config_name, "firefly_gan_vq");
        assert_eq!(config.generation.temperature, 0.5);
        assert_eq!(config.generation.top_p, 0.7);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config: GatewayConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(config.mode(), OperatingMode::Tts);
        assert!(!config.inference.load_asr_model);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("gateway.json");
        std::fs::write(&json, r#"{"server": {"workers": 2}}"#).unwrap();
        assert_eq!(GatewayConfig::load(&json).unwrap().server.workers, 2);

        let toml = dir.path().join("gateway.toml");
        std::fs::write(&toml, "").unwrap();
        assert!(GatewayConfig::load(&toml).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = GatewayConfig::default();
        config.server.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_latent_frames() {
        let mut config = GatewayConfig::default();
        config.server.max_latent_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_precision() {
        assert_eq!(parse_precision("f32").unwrap(), Precision::Float32);
        assert_eq!(parse_precision("half").unwrap(), Precision::Float16);
        assert_eq!(parse_precision("bfloat16").unwrap(), Precision::BFloat16);
        assert!(parse_precision("int8").is_err());
        assert!(parse_precision("").is_err());
    }
}

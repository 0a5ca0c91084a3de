//! HTTP server command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Args;

use crate::config::{parse_precision, DeviceConfig, GatewayConfig, OperatingMode, Precision};
use crate::engine::ReferenceLoader;
use crate::server;

/// Flags for `voxgate serve`; each one overrides the config file
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Configuration file (YAML or JSON)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Address to listen on (host:port)
    #[arg(long)]
    pub listen: Option<String>,

    /// Device (cuda, cuda:N, mps, cpu)
    #[arg(long)]
    pub device: Option<String>,

    /// Load models in f16 (shorthand for --precision f16)
    #[arg(long, conflicts_with = "precision")]
    pub half: bool,

    /// Numeric precision (f32, f16, bf16)
    #[arg(long)]
    pub precision: Option<String>,

    /// Compile models before serving
    #[arg(long)]
    pub compile: bool,

    /// Operating mode (tts, agent)
    #[arg(long)]
    pub mode: Option<OperatingMode>,

    /// Also load the transcription model
    #[arg(long)]
    pub load_asr_model: bool,

    /// Language model checkpoint
    #[arg(long)]
    pub llama_checkpoint_path: Option<PathBuf>,

    /// Codec checkpoint
    #[arg(long)]
    pub decoder_checkpoint_path: Option<PathBuf>,

    /// Codec architecture name
    #[arg(long)]
    pub decoder_config_name: Option<String>,

    /// Transcription checkpoint
    #[arg(long)]
    pub asr_checkpoint_path: Option<PathBuf>,

    /// Token table (defaults to tokenizer.tiktoken next to the language model)
    #[arg(long)]
    pub tokenizer: Option<PathBuf>,

    /// Maximum accepted text length in characters (0 = unlimited)
    #[arg(long)]
    pub max_text_length: Option<usize>,

    /// Maximum latent frames per decode request
    #[arg(long)]
    pub max_latent_frames: Option<usize>,

    /// Runtime worker threads
    #[arg(long)]
    pub workers: Option<usize>,
}

impl ServeArgs {
    /// Build the final configuration: defaults, then file, then flags
    pub fn resolve(&self) -> Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => GatewayConfig::default(),
        };

        if let Some(listen) = &self.listen {
            config.server.listen = listen.clone();
        }
        if let Some(workers) = self.workers {
            config.server.workers = workers;
        }
        if let Some(max) = self.max_text_length {
            config.server.max_text_length = max;
        }
        if let Some(max) = self.max_latent_frames {
            config.server.max_latent_frames = max;
        }

        let inference = &mut config.inference;
        if let Some(device) = &self.device {
            inference.device = DeviceConfig::Simple(device.clone());
        }
        if self.half {
            inference.precision = Precision::Float16;
        }
        if let Some(precision) = &self.precision {
            inference.precision = parse_precision(precision)?;
        }
        if self.compile {
            inference.compile = true;
        }
        if let Some(mode) = self.mode {
            inference.mode = mode;
        }
        if self.load_asr_model {
            inference.load_asr_model = true;
        }

        let checkpoints = &mut config.checkpoints;
        if let Some(path) = &self.llama_checkpoint_path {
            checkpoints.llama_checkpoint_path = path.clone();
        }
        if let Some(path) = &self.decoder_checkpoint_path {
            checkpoints.decoder_checkpoint_path = path.clone();
        }
        if let Some(name) = &self.decoder_config_name {
            checkpoints.decoder_config_name = name.clone();
        }
        if let Some(path) = &self.asr_checkpoint_path {
            checkpoints.asr_checkpoint_path = Some(path.clone());
        }
        if let Some(path) = &self.tokenizer {
            checkpoints.tokenizer_path = Some(path.clone());
        }

        config
            .validate()
            .map_err(|e| anyhow!("invalid configuration: {}", e))?;
        Ok(config)
    }
}

/// Start the gateway
///
/// Builds its own multi-thread runtime so the worker count comes from the
/// resolved configuration.
pub fn serve(args: ServeArgs) -> Result<()> {
    let config = args.resolve()?;
    tracing::info!(
        "Starting voxgate (mode={}, device={}, precision={}, workers={})",
        config.mode(),
        config.inference.device,
        config.inference.precision,
        config.server.workers
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(server::start(config, Arc::new(ReferenceLoader::new())))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = ServeArgs {
            listen: Some("0.0.0.0:9000".into()),
            device: Some("cpu".into()),
            half: true,
            mode: Some(OperatingMode::Agent),
            max_text_length: Some(1000),
            max_latent_frames: Some(2100),
            ..Default::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.inference.device.to_string(), "cpu");
        assert_eq!(config.inference.precision, Precision::Float16);
        assert_eq!(config.mode(), OperatingMode::Agent);
        assert_eq!(config.server.max_text_length, 1000);
        assert_eq!(config.server.max_latent_frames, 2100);
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "server:\n  listen: 127.0.0.1:7000\n  workers: 4\ninference:\n  mode: agent"
        )
        .unwrap();

        let args = ServeArgs {
            config: Some(file.path().to_path_buf()),
            workers: Some(2),
            ..Default::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:7000");
        assert_eq!(config.server.workers, 2);
        assert_eq!(config.mode(), OperatingMode::Agent);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let args = ServeArgs {
            workers: Some(0),
            ..Default::default()
        };
        assert!(args.resolve().is_err());

        let args = ServeArgs {
            precision: Some("int3".into()),
            ..Default::default()
        };
        assert!(args.resolve().is_err());
    }
}

//! CLI commands

mod info;
mod serve;

pub use info::info;
pub use serve::{serve, ServeArgs};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// voxgate - Inference gateway for speech models
#[derive(Parser)]
#[command(name = "voxgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP gateway
    Serve(ServeArgs),

    /// Inspect a checkpoint or token table
    Info {
        /// Checkpoint file/directory or token table
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from([
            "voxgate",
            "serve",
            "--listen",
            "0.0.0.0:9000",
            "--half",
            "--mode",
            "agent",
            "--load-asr-model",
            "--max-text-length",
            "1000",
        ])
        .unwrap();

        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.listen.as_deref(), Some("0.0.0.0:9000"));
                assert!(args.half);
                assert!(args.load_asr_model);
                assert_eq!(args.max_text_length, Some(1000));
            }
            Commands::Info { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_info() {
        let cli = Cli::try_parse_from(["voxgate", "info", "checkpoints/model.pth"]).unwrap();
        assert!(matches!(cli.command, Commands::Info { .. }));
    }
}

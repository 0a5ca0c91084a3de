//! Artifact info command

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::loader::detect_checkpoint;
use crate::tokenizer::TokenTable;

/// Show what a checkpoint or token table contains
pub fn info(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("Path not found: {}", path.display()));
    }

    println!("Path: {}\n", path.display());

    if is_token_table(path) {
        print_token_table_info(path)
    } else {
        print_checkpoint_info(path)
    }
}

fn is_token_table(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("tiktoken") | Some("txt") | Some("tsv")
        )
}

fn print_token_table_info(path: &Path) -> Result<()> {
    let table = TokenTable::from_file(path)?;
    println!("Type: token table\n");
    println!("  Tokens: {}", table.vocab_size());
    println!("  Highest index: {}", table.max_index());
    Ok(())
}

fn print_checkpoint_info(path: &Path) -> Result<()> {
    let source = detect_checkpoint(path)?;

    println!("Type: checkpoint\n");
    println!("  Format: {}", source.format);
    println!("  Weights: {}", source.weights_path.display());
    if let Some(config) = &source.config_path {
        println!("  Config: {}", config.display());
        print_config_summary(config)?;
    }

    let size_gb = source.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    if size_gb >= 1.0 {
        println!("\nFile size: {:.2} GB", size_gb);
    } else {
        let size_mb = source.size_bytes as f64 / (1024.0 * 1024.0);
        println!("\nFile size: {:.2} MB", size_mb);
    }

    Ok(())
}

fn print_config_summary(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let config: serde_json::Value = serde_json::from_str(&content)?;

    for key in ["model_type", "dim", "n_layer", "n_head", "vocab_size", "codebook_size"] {
        if let Some(value) = config.get(key) {
            println!("    {}: {}", key, value);
        }
    }
    Ok(())
}

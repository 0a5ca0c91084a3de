//! Checkpoint format and source detection

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

/// Detected checkpoint format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// SafeTensors format (HuggingFace standard)
    SafeTensors,
    /// Pickled torch state dict (.pth, .pt, .ckpt, .bin)
    Torch,
}

impl fmt::Display for CheckpointFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointFormat::SafeTensors => f.write_str("SafeTensors"),
            CheckpointFormat::Torch => f.write_str("Torch"),
        }
    }
}

/// Detected checkpoint source
#[derive(Debug, Clone)]
pub struct CheckpointSource {
    /// Path to the weights file
    pub weights_path: PathBuf,
    /// Path to config file (if present next to the weights)
    pub config_path: Option<PathBuf>,
    /// Detected format
    pub format: CheckpointFormat,
    /// Size of the weights file in bytes
    pub size_bytes: u64,
}

/// Preferred weight file names inside a checkpoint directory
const PREFERRED_NAMES: &[&str] = &[
    "model.safetensors",
    "model.pth",
    "model.ckpt",
    "pytorch_model.bin",
];

fn format_for_extension(ext: &str) -> Option<CheckpointFormat> {
    match ext {
        "safetensors" => Some(CheckpointFormat::SafeTensors),
        "pth" | "pt" | "ckpt" | "bin" => Some(CheckpointFormat::Torch),
        _ => None,
    }
}

/// Detect checkpoint format and source from a path
///
/// The path can be:
/// - A direct path to a weights file
/// - A directory containing one
pub fn detect_checkpoint<P: AsRef<Path>>(path: P) -> Result<CheckpointSource> {
    let path = path.as_ref();

    if path.is_file() {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let format = format_for_extension(ext)
            .ok_or_else(|| anyhow!("Unsupported checkpoint file format: .{}", ext))?;
        source_for(path, format, path.parent())
    } else if path.is_dir() {
        detect_checkpoint_in_directory(path)
    } else {
        Err(anyhow!("Checkpoint path does not exist: {}", path.display()))
    }
}

/// Detect checkpoint files in a directory
fn detect_checkpoint_in_directory(dir: &Path) -> Result<CheckpointSource> {
    for name in PREFERRED_NAMES {
        let candidate = dir.join(name);
        if candidate.is_file() {
            let ext = candidate.extension().and_then(|e| e.to_str()).unwrap_or("");
            if let Some(format) = format_for_extension(ext) {
                return source_for(&candidate, format, Some(dir));
            }
        }
    }

    // Fall back to the first weights file by name, SafeTensors preferred
    let mut candidates: Vec<(CheckpointFormat, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter_map(|p| {
            let format = format_for_extension(p.extension()?.to_str()?)?;
            Some((format, p))
        })
        .collect();
    candidates.sort_by(|(fa, pa), (fb, pb)| {
        let rank = |f: &CheckpointFormat| matches!(f, CheckpointFormat::Torch) as u8;
        rank(fa).cmp(&rank(fb)).then_with(|| pa.cmp(pb))
    });

    match candidates.into_iter().next() {
        Some((format, path)) => source_for(&path, format, Some(dir)),
        None => Err(anyhow!("No checkpoint files found in: {}", dir.display())),
    }
}

fn source_for(
    weights_path: &Path,
    format: CheckpointFormat,
    dir: Option<&Path>,
) -> Result<CheckpointSource> {
    let size_bytes = std::fs::metadata(weights_path)?.len();
    if size_bytes == 0 {
        return Err(anyhow!("Checkpoint file is empty: {}", weights_path.display()));
    }

    let config_path = dir
        .map(|d| d.join("config.json"))
        .filter(|p| p.is_file());

    Ok(CheckpointSource {
        weights_path: weights_path.to_path_buf(),
        config_path,
        format,
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"weights").unwrap();
    }

    #[test]
    fn test_direct_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generator.pth");
        touch(&path);

        let source = detect_checkpoint(&path).unwrap();
        assert_eq!(source.format, CheckpointFormat::Torch);
        assert_eq!(source.size_bytes, 7);
        assert!(source.config_path.is_none());
    }

    #[test]
    fn test_directory_prefers_known_names() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("aaa.pth"));
        touch(&dir.path().join("model.pth"));
        std::fs::write(dir.path().join("config.json"), "{}").unwrap();

        let source = detect_checkpoint(dir.path()).unwrap();
        assert_eq!(source.weights_path, dir.path().join("model.pth"));
        assert!(source.config_path.is_some());
    }

    #[test]
    fn test_directory_fallback_prefers_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a_weights.ckpt"));
        touch(&dir.path().join("z_weights.safetensors"));

        let source = detect_checkpoint(dir.path()).unwrap();
        assert_eq!(source.format, CheckpointFormat::SafeTensors);
    }

    #[test]
    fn test_rejects_unknown_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("notes.txt");
        touch(&txt);
        assert!(detect_checkpoint(&txt).is_err());
        assert!(detect_checkpoint(dir.path().join("nope")).is_err());

        let empty = tempfile::tempdir().unwrap();
        assert!(detect_checkpoint(empty.path()).is_err());
    }

    #[test]
    fn test_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pth");
        std::fs::write(&path, b"").unwrap();
        assert!(detect_checkpoint(&path).is_err());
    }
}

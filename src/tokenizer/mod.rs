//! Token table loading
//!
//! The language model ships its vocabulary as a plain-text token table
//! produced offline from the HuggingFace `tokenizer.json`:
//!
//! ```text
//! <base64_token>\t<index>
//! ```
//!
//! Example: `SGVsbG8=\t1000` where "SGVsbG8=" decodes to "Hello". The first
//! 256 entries are the single-byte tokens, so any UTF-8 input can be encoded.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use base64::Engine;

/// Bidirectional token table
#[derive(Debug, Clone)]
pub struct TokenTable {
    by_bytes: HashMap<Vec<u8>, u32>,
    by_id: HashMap<u32, Vec<u8>>,
    max_token_len: usize,
}

impl TokenTable {
    /// Load a token table from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read token table {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid token table {}", path.display()))
    }

    /// Parse token table text
    pub fn parse(content: &str) -> Result<Self> {
        let engine = base64::engine::general_purpose::STANDARD;
        let mut by_bytes = HashMap::new();
        let mut by_id = HashMap::new();
        let mut max_token_len = 0;

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (token, index) = line
                .split_once('\t')
                .or_else(|| line.split_once(' '))
                .ok_or_else(|| anyhow!("line {}: expected '<token>\\t<index>'", lineno + 1))?;

            let bytes = engine
                .decode(token.trim())
                .map_err(|e| anyhow!("line {}: bad base64 token: {}", lineno + 1, e))?;
            let id: u32 = index
                .trim()
                .parse()
                .map_err(|e| anyhow!("line {}: bad index '{}': {}", lineno + 1, index, e))?;

            if bytes.is_empty() {
                return Err(anyhow!("line {}: empty token", lineno + 1));
            }
            if by_id.contains_key(&id) {
                return Err(anyhow!("line {}: duplicate index {}", lineno + 1, id));
            }
            if by_bytes.contains_key(&bytes) {
                return Err(anyhow!("line {}: duplicate token for index {}", lineno + 1, id));
            }

            max_token_len = max_token_len.max(bytes.len());
            by_id.insert(id, bytes.clone());
            by_bytes.insert(bytes, id);
        }

        if let Some(missing) = (0u8..=255).find(|b| !by_bytes.contains_key(&vec![*b])) {
            return Err(anyhow!(
                "token table does not cover single byte 0x{:02x}",
                missing
            ));
        }

        Ok(Self {
            by_bytes,
            by_id,
            max_token_len,
        })
    }

    /// Encode text to token IDs using greedy longest match
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let bytes = text.as_bytes();
        let mut ids = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() {
            let longest = self.max_token_len.min(bytes.len() - pos);
            // Single bytes are always present, so this loop always finds a match.
            for len in (1..=longest).rev() {
                if let Some(&id) = self.by_bytes.get(&bytes[pos..pos + len]) {
                    ids.push(id);
                    pos += len;
                    break;
                }
            }
        }

        ids
    }

    /// Decode token IDs to text
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        let mut bytes = Vec::new();
        for id in ids {
            let token = self
                .by_id
                .get(id)
                .ok_or_else(|| anyhow!("unknown token id {}", id))?;
            bytes.extend_from_slice(token);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Get vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.by_id.len()
    }

    /// Highest token index in the table
    pub fn max_index(&self) -> u32 {
        self.by_id.keys().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) fn test_table(extra: &[&str]) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut lines: Vec<String> = (0u32..256)
        .map(|i| format!("{}\t{}", engine.encode([i as u8]), i))
        .collect();
    for (offset, token) in extra.iter().enumerate() {
        lines.push(format!("{}\t{}", engine.encode(token), 256 + offset));
    }
    lines.join("\n")
}

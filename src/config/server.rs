//! Server configuration settings

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (`host:port`)
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Number of runtime worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum accepted text length in characters (0 = unlimited)
    #[serde(default)]
    pub max_text_length: usize,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Maximum latent frames accepted by one decode request
    #[serde(default = "default_max_latent_frames")]
    pub max_latent_frames: usize,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_workers() -> usize {
    1
}

fn default_max_body_size() -> usize {
    64 * 1024 * 1024 // 64 MiB, room for multi-second reference audio
}

fn default_max_latent_frames() -> usize {
    21 * 600 // ten minutes at 21 frames per second
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: default_workers(),
            max_text_length: 0,
            max_body_size: default_max_body_size(),
            max_latent_frames: default_max_latent_frames(),
        }
    }
}

impl ServerConfig {
    /// Parse the listen address
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address '{}': {}", self.listen, e))
    }

    /// Check a text length against the configured bound
    pub fn text_within_limit(&self, text: &str) -> bool {
        self.max_text_length == 0 || text.chars().count() <= self.max_text_length
    }

    /// Check a decode request's total frame count against the configured bound
    pub fn frames_within_limit(&self, frames: usize) -> bool {
        frames <= self.max_latent_frames
    }
}

//! voxgate - Inference gateway for speech models
//!
//! voxgate owns a set of heavyweight speech models (audio codec,
//! transcriber, synthesizer, conversational model), exposes them over a
//! versioned HTTP API, and serializes access to the shared device they live
//! on.
//!
//! # Architecture
//!
//! - **engine**: resource manager, access arbiter, lifecycle controller
//! - **server**: routes, request/response envelopes, error translation
//! - **config / loader / tokenizer / audio**: what is read at startup and
//!   converted at the HTTP boundary
//!
//! # Example
//!
//! ```bash
//! # Serve TTS on the GPU in f16
//! voxgate serve --device cuda --half --listen 0.0.0.0:8080
//!
//! # Agent mode with transcription
//! voxgate serve --mode agent --load-asr-model --asr-checkpoint-path checkpoints/asr
//!
//! # Inspect an artifact
//! voxgate info checkpoints/fish-speech-1.5
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod server;
pub mod tokenizer;

// Re-export key types
pub use config::{GatewayConfig, GenerationConfig, ServerConfig};
pub use engine::{Arbiter, Family, Lifecycle, LifecycleState, ModelLoader, ResourceManager};
pub use error::{GatewayError, Result};

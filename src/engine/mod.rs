//! Core serving engine
//!
//! This module owns everything between the HTTP layer and the models:
//! - ResourceManager: the immutable set of loaded model families
//! - Arbiter: the global lock serializing model invocations
//! - Lifecycle: two-phase startup and the readiness gate
//! - ReferenceLoader: a CPU backend for the capability traits

mod arbiter;
mod capability;
mod lifecycle;
mod reference;
mod resources;

pub use arbiter::{AccessToken, Arbiter, ArbiterSnapshot};
pub use capability::{
    ChatTurn, Codec, Conversational, Family, Latent, SynthesisInput, Synthesizer, Transcriber,
    Transcript, VoiceReference,
};
pub use lifecycle::{Lifecycle, LifecycleReport, LifecycleState};
pub use reference::ReferenceLoader;
pub use resources::{LoadSpec, ModelLoader, Requirement, ResourceHandle, ResourceManager};

//! Route definitions

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::handlers::{
    chat, decode, encode, health, require_families, require_ready, synthesize, transcribe,
    AppState,
};
use crate::engine::Family;

const CODEC: &[Family] = &[Family::Codec];
const TRANSCRIBER: &[Family] = &[Family::Transcriber];
const SYNTHESIZER: &[Family] = &[Family::Synthesizer];
const CONVERSATION: &[Family] = &[Family::Conversational, Family::Synthesizer];

/// Create the versioned API router
///
/// Health answers in every lifecycle state. Every other route sits behind
/// the readiness gate, then behind a check that its families are loaded.
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let models = Router::new()
        // Codec
        .route(
            "/v1/vqgan/encode",
            post(encode).route_layer(middleware::from_fn_with_state(CODEC, require_families)),
        )
        .route(
            "/v1/vqgan/decode",
            post(decode).route_layer(middleware::from_fn_with_state(CODEC, require_families)),
        )
        // Transcription
        .route(
            "/v1/asr",
            post(transcribe)
                .route_layer(middleware::from_fn_with_state(TRANSCRIBER, require_families)),
        )
        // Synthesis
        .route(
            "/v1/tts",
            post(synthesize)
                .route_layer(middleware::from_fn_with_state(SYNTHESIZER, require_families)),
        )
        // Conversation
        .route(
            "/v1/chat",
            post(chat).route_layer(middleware::from_fn_with_state(CONVERSATION, require_families)),
        )
        .route_layer(middleware::from_fn_with_state(state, require_ready));

    Router::new().route("/v1/health", get(health)).merge(models)
}

//! HTTP server for the speech models
//!
//! Construction is cheap: the router and state are built before any model
//! is loaded. Model loading runs once, in the background, after the
//! listener binds; until it finishes only `/v1/health` answers normally.

mod envelope;
mod error;
mod handlers;
mod routes;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Request},
    Router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::engine::ModelLoader;

pub use envelope::{Encoded, Envelope, WireFormat, MSGPACK};
pub use error::{translate, ErrorEnvelope};
pub use handlers::{AppState, AudioFormat, HealthResponse};
pub use routes::api_routes;

/// Build the full application: routes, fallback, and middleware
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(Arc::clone(&state)))
        .method_not_allowed_fallback(error::method_not_allowed)
        .fallback(error::not_found)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size))
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
            tracing::info_span!(
                "request",
                id = %Uuid::new_v4(),
                method = %req.method(),
                uri = %req.uri()
            )
        }))
        .layer(cors)
        .with_state(state)
}

/// Bind, start loading models, and serve until Ctrl-C or SIGTERM
pub async fn start(config: GatewayConfig, loader: Arc<dyn ModelLoader>) -> Result<()> {
    let config = Arc::new(config);
    let state = Arc::new(AppState::new(Arc::clone(&config)));
    let app = build_router(Arc::clone(&state));

    let addr = config.server.addr()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /v1/health - Health and readiness");
    tracing::info!("  POST /v1/vqgan/encode - Audio to latent codes");
    tracing::info!("  POST /v1/vqgan/decode - Latent codes to audio");
    tracing::info!("  POST /v1/asr - Speech to text");
    tracing::info!("  POST /v1/tts - Text to speech");
    tracing::info!("  POST /v1/chat - Conversation");

    let lifecycle = Arc::clone(&state.lifecycle);
    tokio::spawn(async move {
        if let Err(e) = lifecycle.start(config, loader).await {
            tracing::error!("Startup did not run: {:#}", e);
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

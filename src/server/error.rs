//! API error handling
//!
//! Every failure leaves the server through `translate`, so every error body
//! has the same `{status_code, message, kind}` shape. Internal detail is
//! logged, never returned.

use std::any::Any;

use axum::{
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// External error body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub status_code: u16,
    pub message: String,
    pub kind: String,
}

const GENERIC_INTERNAL_MESSAGE: &str = "internal server error";

/// Map a failure to its status code and envelope
pub fn translate(err: &GatewayError) -> (StatusCode, ErrorEnvelope) {
    let (status, kind, message) = match err {
        GatewayError::Validation { .. } => {
            (StatusCode::BAD_REQUEST, "validation_error", err.to_string())
        }
        GatewayError::ResourceUnavailable(_) => (
            StatusCode::NOT_FOUND,
            "resource_unavailable",
            err.to_string(),
        ),
        GatewayError::ServiceNotReady(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "service_not_ready",
            err.to_string(),
        ),
        GatewayError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        GatewayError::MethodNotAllowed { .. } => (
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            err.to_string(),
        ),
        GatewayError::Inference(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "inference_error",
            "inference failed".to_string(),
        ),
        GatewayError::Initialization { .. } | GatewayError::Internal(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            GENERIC_INTERNAL_MESSAGE.to_string(),
        ),
    };

    (
        status,
        ErrorEnvelope {
            status_code: status.as_u16(),
            message,
            kind: kind.to_string(),
        },
    )
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, envelope) = translate(&self);
        if status.is_server_error() {
            tracing::error!("{} ({}): {}", envelope.kind, status, self);
        } else {
            tracing::debug!("{} ({}): {}", envelope.kind, status, self);
        }
        (status, Json(envelope)).into_response()
    }
}

/// Fallback for unknown routes
pub async fn not_found(uri: Uri) -> GatewayError {
    GatewayError::NotFound(uri.path().to_string())
}

/// Fallback for known paths hit with the wrong method
pub async fn method_not_allowed(method: Method, uri: Uri) -> GatewayError {
    GatewayError::MethodNotAllowed {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

/// Panic handler for `CatchPanicLayer`
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    GatewayError::Internal(anyhow::anyhow!("handler panicked: {}", detail)).into_response()
}

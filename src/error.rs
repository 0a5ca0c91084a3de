//! Gateway error taxonomy
//!
//! Every failure a request can hit is one of these kinds. The HTTP layer
//! turns them into the external envelope in exactly one place
//! (`server::error::translate`).

use thiserror::Error;

use crate::engine::{Family, LifecycleState};

/// Result alias used across the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad or oversized input. Never reaches the model layer.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// The family is not loaded in this deployment
    #[error("{0} is not enabled on this server")]
    ResourceUnavailable(Family),

    /// Startup has not completed (or failed)
    #[error("service is not ready (state: {0})")]
    ServiceNotReady(LifecycleState),

    /// The model invocation itself failed
    #[error("inference failed: {0:#}")]
    Inference(#[source] anyhow::Error),

    /// A required family could not be loaded at startup
    #[error("failed to initialize {family}: {source:#}")]
    Initialization {
        family: Family,
        #[source]
        source: anyhow::Error,
    },

    /// Anything unanticipated: encoding failures, panics, lost tasks
    #[error("internal error: {0:#}")]
    Internal(#[source] anyhow::Error),

    /// No route matches the request path
    #[error("no route for {0}")]
    NotFound(String),

    /// The path exists but not for this method
    #[error("{method} is not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },
}

impl GatewayError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn inference(err: impl Into<anyhow::Error>) -> Self {
        Self::Inference(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_names_field() {
        let err = GatewayError::validation("text", "must not be empty");
        assert_eq!(err.to_string(), "text: must not be empty");
    }

    #[test]
    fn test_inference_display_keeps_chain() {
        let inner = anyhow::anyhow!("cuda oom").context("decoder forward");
        let err = GatewayError::inference(inner);
        assert_eq!(err.to_string(), "inference failed: decoder forward: cuda oom");
    }
}

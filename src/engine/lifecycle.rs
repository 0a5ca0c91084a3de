//! Lifecycle controller
//!
//! `constructed → starting → ready` or `constructed → starting → failed`.
//! Startup runs exactly once; there is no automatic retry.

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::resources::{ModelLoader, ResourceManager};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

/// Externally visible lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Constructed,
    Starting,
    Ready,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Constructed => "constructed",
            LifecycleState::Starting => "starting",
            LifecycleState::Ready => "ready",
            LifecycleState::Failed => "failed",
        })
    }
}

enum Phase {
    Constructed,
    Starting,
    Ready {
        resources: Arc<ResourceManager>,
        since: DateTime<Utc>,
    },
    Failed {
        reason: String,
        since: DateTime<Utc>,
    },
}

impl Phase {
    fn state(&self) -> LifecycleState {
        match self {
            Phase::Constructed => LifecycleState::Constructed,
            Phase::Starting => LifecycleState::Starting,
            Phase::Ready { .. } => LifecycleState::Ready,
            Phase::Failed { .. } => LifecycleState::Failed,
        }
    }
}

/// What the health endpoint reports
pub struct LifecycleReport {
    pub state: LifecycleState,
    pub resources: Option<Arc<ResourceManager>>,
    pub error: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

/// Failure summary for the health report; the full chain goes to the log
fn public_reason(err: &GatewayError) -> String {
    match err {
        GatewayError::Initialization { family, .. } => format!("{} failed to load", family),
        _ => "startup did not complete".to_string(),
    }
}

/// Process-wide lifecycle and readiness gate
pub struct Lifecycle {
    phase: RwLock<Phase>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            phase: RwLock::new(Phase::Constructed),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        self.phase.read().await.state()
    }

    /// Resources if ready, `ServiceNotReady` otherwise
    pub async fn resources(&self) -> Result<Arc<ResourceManager>> {
        match &*self.phase.read().await {
            Phase::Ready { resources, .. } => Ok(Arc::clone(resources)),
            other => Err(GatewayError::ServiceNotReady(other.state())),
        }
    }

    pub async fn report(&self) -> LifecycleReport {
        let phase = self.phase.read().await;
        let (resources, error, since) = match &*phase {
            Phase::Ready { resources, since } => (Some(Arc::clone(resources)), None, Some(*since)),
            Phase::Failed { reason, since } => (None, Some(reason.clone()), Some(*since)),
            _ => (None, None, None),
        };
        LifecycleReport {
            state: phase.state(),
            resources,
            error,
            since,
        }
    }

    /// Move from `constructed` to `starting`; fails if startup already began
    pub async fn begin_startup(&self) -> anyhow::Result<()> {
        let mut phase = self.phase.write().await;
        match &*phase {
            Phase::Constructed => {
                *phase = Phase::Starting;
                Ok(())
            }
            other => Err(anyhow!("startup already ran (state: {})", other.state())),
        }
    }

    /// Record the outcome of startup
    pub async fn complete_startup(&self, outcome: Result<ResourceManager>) -> LifecycleState {
        let mut phase = self.phase.write().await;
        if !matches!(&*phase, Phase::Starting) {
            tracing::warn!(
                "Ignoring startup result in state {}",
                phase.state()
            );
            return phase.state();
        }

        *phase = match outcome {
            Ok(resources) => {
                tracing::info!(
                    "Startup complete, serving: {}",
                    resources
                        .enabled()
                        .iter()
                        .map(|f| f.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                Phase::Ready {
                    resources: Arc::new(resources),
                    since: Utc::now(),
                }
            }
            Err(e) => {
                tracing::error!("Startup failed: {}", e);
                Phase::Failed {
                    reason: public_reason(&e),
                    since: Utc::now(),
                }
            }
        };
        phase.state()
    }

    /// Run startup: load every configured family on the blocking pool
    pub async fn start(
        &self,
        config: Arc<GatewayConfig>,
        loader: Arc<dyn ModelLoader>,
    ) -> anyhow::Result<LifecycleState> {
        self.begin_startup().await?;
        tracing::info!("Loading models (mode: {})", config.mode());

        let outcome = tokio::task::spawn_blocking(move || {
            ResourceManager::initialize(&config, loader.as_ref())
        })
        .await
        .unwrap_or_else(|e| {
            Err(GatewayError::Internal(anyhow!(
                "startup task did not complete: {}",
                e
            )))
        });

        Ok(self.complete_startup(outcome).await)
    }
}

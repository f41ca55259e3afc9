//! Scaling of target workloads.
//!
//! The controller only needs one operation: set a workload's replica count.
//! Implementations must treat repeated calls with an unchanged count as
//! harmless.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from a scale call.
#[derive(Debug, Error)]
pub enum ScaleError {
    /// The target workload does not exist.
    #[error("scale target {namespace}/{name} not found")]
    TargetNotFound { namespace: String, name: String },

    /// The API rejected the request.
    #[error("scale request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The request could not be sent or timed out.
    #[error("scale request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Applies a replica count to a named workload.
#[async_trait]
pub trait Scaler: Send + Sync {
    async fn set_replicas(
        &self,
        namespace: &str,
        target: &str,
        replicas: u32,
    ) -> Result<(), ScaleError>;
}

// =============================================================================
// Kubernetes scale subresource
// =============================================================================

/// Scales Deployments through the Kubernetes `scale` subresource.
#[derive(Debug, Clone)]
pub struct KubeScaleClient {
    client: reqwest::Client,
    base_url: String,
}

impl KubeScaleClient {
    /// Create a client for the given API server.
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .context("Invalid token format")?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn scale_url(&self, namespace: &str, name: &str) -> String {
        format!(
            "{}/apis/apps/v1/namespaces/{}/deployments/{}/scale",
            self.base_url, namespace, name
        )
    }
}

#[async_trait]
impl Scaler for KubeScaleClient {
    async fn set_replicas(
        &self,
        namespace: &str,
        target: &str,
        replicas: u32,
    ) -> Result<(), ScaleError> {
        let url = self.scale_url(namespace, target);
        let body = serde_json::json!({ "spec": { "replicas": replicas } });
        debug!(url = %url, replicas, "Patching scale subresource");

        let response = self
            .client
            .patch(&url)
            .header(CONTENT_TYPE, "application/merge-patch+json")
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ScaleError::TargetNotFound {
                namespace: namespace.to_string(),
                name: target.to_string(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(ScaleError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

// =============================================================================
// In-memory scaler
// =============================================================================

/// One call made to [`InMemoryScaler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleCall {
    pub namespace: String,
    pub target: String,
    pub replicas: u32,
}

/// Scaler that only tracks replica counts in memory.
///
/// Used for dry runs and tests. Failures can be injected per target or for
/// the next N calls.
#[derive(Debug, Default)]
pub struct InMemoryScaler {
    replicas: Mutex<HashMap<(String, String), u32>>,
    calls: Mutex<Vec<ScaleCall>>,
    failing_targets: Mutex<HashSet<String>>,
    fail_next: AtomicU32,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call for the named target.
    pub fn fail_target(&self, target: impl Into<String>) {
        lock(&self.failing_targets).insert(target.into());
    }

    /// Fail the next `n` calls, whatever their target.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Current replica count of a target, if it was ever scaled.
    pub fn replicas(&self, namespace: &str, target: &str) -> Option<u32> {
        lock(&self.replicas)
            .get(&(namespace.to_string(), target.to_string()))
            .copied()
    }

    /// Every call made, including failed ones.
    pub fn calls(&self) -> Vec<ScaleCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Scaler for InMemoryScaler {
    async fn set_replicas(
        &self,
        namespace: &str,
        target: &str,
        replicas: u32,
    ) -> Result<(), ScaleError> {
        lock(&self.calls).push(ScaleCall {
            namespace: namespace.to_string(),
            target: target.to_string(),
            replicas,
        });

        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected || lock(&self.failing_targets).contains(target) {
            return Err(ScaleError::Other(format!(
                "injected failure scaling {}/{}",
                namespace, target
            )));
        }

        let previous = lock(&self.replicas).insert(
            (namespace.to_string(), target.to_string()),
            replicas,
        );
        if previous != Some(replicas) {
            info!(
                namespace,
                target,
                replicas,
                previous = ?previous,
                "[DRY RUN] Scaling workload"
            );
        }
        Ok(())
    }
}

//! Backend registry with availability-based fallback.
//!
//! Backends are stored in registration order. Selection walks a preferred
//! order (or registration order when none is given), probes each candidate
//! and returns the first one that answers.
//!
//! ```text
//! preferred: [ollama, anthropic, openai]
//!                │
//!                ▼
//!   ollama.is_available()    ──► false (server not running)
//!                │
//!                ▼
//!   anthropic.is_available() ──► true  ──► selected
//! ```
//!
//! Probes are bounded by the registry's probe timeout; a probe that hangs
//! counts as unavailable. Unavailable backends are never asked to analyze.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, instrument, warn};

use super::traits::AnalysisBackend;
use crate::telemetry;
use crate::{MuninnError, Result};

/// Default bound on one availability probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe outcome for one backend, as reported by [`BackendRegistry::probe_all`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub model: String,
    pub available: bool,
}

/// Registry of analysis backends.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn AnalysisBackend>>,
    probe_timeout: Duration,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self {
            backends: Vec::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

impl BackendRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the per-probe bound.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Register a backend. Lookups by name return the first registration.
    pub fn add(&mut self, backend: Arc<dyn AnalysisBackend>) {
        if self.get(backend.name()).is_some() {
            warn!(backend = backend.name(), "duplicate backend name, later registration is unreachable");
        }
        self.backends.push(backend);
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, backend: Arc<dyn AnalysisBackend>) -> Self {
        self.add(backend);
        self
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AnalysisBackend>> {
        self.backends.iter().find(|b| b.name() == name).cloned()
    }

    /// Backends in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AnalysisBackend>> {
        self.backends.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// First available backend in `preferred` order.
    ///
    /// An empty `preferred` means registration order. Names that are not
    /// registered are skipped with a warning. Candidates are probed one at
    /// a time so a cheap local backend short-circuits hosted ones. A
    /// preferred order naming no registered backend is a configuration
    /// error.
    #[instrument(skip(self), fields(operation = "select"))]
    pub async fn select(&self, preferred: &[String]) -> Result<Arc<dyn AnalysisBackend>> {
        let candidates: Vec<Arc<dyn AnalysisBackend>> = if preferred.is_empty() {
            self.backends.clone()
        } else {
            preferred
                .iter()
                .filter_map(|name| {
                    let found = self.get(name);
                    if found.is_none() {
                        warn!(backend = %name, "unknown backend in preferred order, skipping");
                    }
                    found
                })
                .collect()
        };

        if candidates.is_empty() && !preferred.is_empty() {
            return Err(MuninnError::Configuration(format!(
                "no registered backend in preferred order [{}]",
                preferred.join(", ")
            )));
        }

        let mut tried = Vec::with_capacity(candidates.len());
        for backend in candidates {
            tried.push(backend.name().to_string());
            if self.probe(backend.as_ref()).await {
                info!(backend = backend.name(), model = backend.model(), "selected backend");
                return Ok(backend);
            }
        }

        Err(MuninnError::NoBackendAvailable { tried })
    }

    /// Use exactly `name`, bypassing the fallback order.
    #[instrument(skip(self), fields(operation = "select_forced"))]
    pub async fn select_forced(&self, name: &str) -> Result<Arc<dyn AnalysisBackend>> {
        let backend = self
            .get(name)
            .ok_or_else(|| MuninnError::UnknownBackend(name.to_string()))?;
        if self.probe(backend.as_ref()).await {
            info!(backend = name, model = backend.model(), "using forced backend");
            Ok(backend)
        } else {
            Err(MuninnError::NoBackendAvailable {
                tried: vec![name.to_string()],
            })
        }
    }

    /// Probe every backend concurrently, in registration order.
    pub async fn probe_all(&self) -> Vec<BackendStatus> {
        let probes = self.backends.iter().map(|b| async move {
            BackendStatus {
                name: b.name().to_string(),
                model: b.model().to_string(),
                available: self.probe(b.as_ref()).await,
            }
        });
        join_all(probes).await
    }

    async fn probe(&self, backend: &dyn AnalysisBackend) -> bool {
        let available = tokio::time::timeout(self.probe_timeout, backend.is_available())
            .await
            .unwrap_or_else(|_| {
                debug!(backend = backend.name(), timeout = ?self.probe_timeout, "probe timed out");
                false
            });
        let status = if available { "available" } else { "unavailable" };
        debug!(backend = backend.name(), status, "probe finished");
        metrics::counter!(telemetry::PROBES_TOTAL,
            "backend" => backend.name().to_owned(),
            "status" => status,
        )
        .increment(1);
        available
    }
}

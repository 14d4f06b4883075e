//! The capability set every analysis backend implements.
//!
//! A backend is an interchangeable provider of one operation, `analyze`,
//! plus an availability probe. Concrete variants live next to this module
//! ([`OllamaBackend`](super::OllamaBackend),
//! [`AnthropicBackend`](super::AnthropicBackend),
//! [`OpenAiBackend`](super::OpenAiBackend)); tests plug in their own.
//!
//! # Error contract
//!
//! `analyze` returns typed errors so the retry layer can tell transient
//! failures (network, timeout, 5xx, 429) from fatal ones (auth, 4xx,
//! invalid payload). `is_available` never errors: anything short of a
//! positive answer means "not available".

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;
use crate::types::{AnalysisResult, Prompt};

/// Default batch budget when a backend does not override it.
pub const DEFAULT_TOKEN_BUDGET: usize = 8_000;

/// Default per-call timeout for `analyze`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// An analysis provider selectable at runtime.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Backend identity (e.g. `"ollama"`). Used for selection, rate limiting
    /// and logging.
    fn name(&self) -> &str;

    /// Model identifier this backend sends requests to. Part of the cache key.
    fn model(&self) -> &str;

    /// Maximum estimated tokens per batch.
    fn token_budget(&self) -> usize {
        DEFAULT_TOKEN_BUDGET
    }

    /// Request ceiling per minute; `0` disables pacing.
    fn requests_per_minute(&self) -> u32 {
        0
    }

    /// Upper bound for a single `analyze` call.
    fn request_timeout(&self) -> Duration {
        DEFAULT_REQUEST_TIMEOUT
    }

    /// Cheap reachability check (server up, credentials configured).
    async fn is_available(&self) -> bool;

    /// Analyse one batch of prompts.
    async fn analyze(&self, prompts: &[Prompt]) -> Result<AnalysisResult>;
}

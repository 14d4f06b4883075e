//! Builder for configuring orchestrator instances

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::orchestrator::Orchestrator;
use crate::backends::{
    AnalysisBackend, AnthropicBackend, BackendRegistry, DEFAULT_ANTHROPIC_MODEL,
    DEFAULT_ANTHROPIC_URL, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_OPENAI_MODEL,
    DEFAULT_OPENAI_URL, OllamaBackend, OpenAiBackend, RateLimiter, RetryConfig, RetryExecutor,
    template_hash,
};
use crate::batch::PackingPolicy;
use crate::cache::CacheStore;
use crate::config::{Config, Secrets};
use crate::{MuninnError, Result};

/// Builder for [`Orchestrator`].
///
/// ```rust,no_run
/// # use muninn::{Orchestrator, OllamaBackend, RetryConfig};
/// # use std::sync::Arc;
/// # fn main() -> muninn::Result<()> {
/// let orchestrator = Orchestrator::builder()
///     .backend(Arc::new(OllamaBackend::new("llama3.1:8b")?))
///     .retry(RetryConfig::new().max_attempts(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct OrchestratorBuilder {
    registry: BackendRegistry,
    cache: Option<CacheStore>,
    limiter: Option<RateLimiter>,
    retry: RetryConfig,
    preferred_order: Vec<String>,
    force_backend: Option<String>,
    token_budget: Option<usize>,
    packing: PackingPolicy,
    bypass_cache: bool,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            registry: BackendRegistry::new(),
            cache: None,
            limiter: None,
            retry: RetryConfig::default(),
            preferred_order: Vec::new(),
            force_backend: None,
            token_budget: None,
            packing: PackingPolicy::default(),
            bypass_cache: false,
        }
    }

    /// Builder pre-populated from configuration and secrets.
    ///
    /// Registers ollama, anthropic and openai (in that order) unless a
    /// backend's section sets `disabled = true`. Hosted backends without an
    /// API key are still registered; their probe reports them unavailable.
    pub fn from_config(config: &Config, secrets: &Secrets) -> Result<Self> {
        let mut builder = Self::new()
            .probe_timeout(config.probe.timeout())
            .retry(RetryConfig::from(&config.retry))
            .preferred_order(config.analysis.preferred_order.iter().cloned())
            .packing(config.analysis.packing)
            .bypass_cache(config.analysis.bypass_cache);

        if let Some(name) = &config.analysis.force_backend {
            builder = builder.force_backend(name.clone());
        }
        if let Some(tokens) = config.analysis.token_budget {
            builder = builder.token_budget(tokens);
        }
        if !config.cache.disabled {
            builder = builder.cache(CacheStore::new(
                config.cache.root(),
                template_hash(),
                config.cache.ttl(),
            ));
        }

        let settings = config.backends.ollama.clone().unwrap_or_default();
        if !settings.disabled {
            let mut backend = OllamaBackend::with_base_url(
                settings.model.as_deref().unwrap_or(DEFAULT_OLLAMA_MODEL),
                settings.base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL),
            )?;
            if let Some(tokens) = settings.token_budget {
                backend = backend.token_budget(tokens);
            }
            if let Some(rpm) = settings.requests_per_minute {
                backend = backend.requests_per_minute(rpm);
            }
            if let Some(timeout) = settings.request_timeout() {
                backend = backend.request_timeout(timeout);
            }
            builder = builder.backend(Arc::new(backend));
        }

        let settings = config.backends.anthropic.clone().unwrap_or_default();
        if !settings.disabled {
            let mut backend = AnthropicBackend::with_base_url(
                secrets.api_key("anthropic").unwrap_or_default(),
                settings.model.as_deref().unwrap_or(DEFAULT_ANTHROPIC_MODEL),
                settings.base_url.as_deref().unwrap_or(DEFAULT_ANTHROPIC_URL),
            )?;
            if let Some(tokens) = settings.token_budget {
                backend = backend.token_budget(tokens);
            }
            if let Some(rpm) = settings.requests_per_minute {
                backend = backend.requests_per_minute(rpm);
            }
            if let Some(timeout) = settings.request_timeout() {
                backend = backend.request_timeout(timeout);
            }
            builder = builder.backend(Arc::new(backend));
        }

        let settings = config.backends.openai.clone().unwrap_or_default();
        if !settings.disabled {
            let mut backend = OpenAiBackend::with_base_url(
                secrets.api_key("openai").unwrap_or_default(),
                settings.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL),
                settings.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_URL),
            )?;
            if let Some(tokens) = settings.token_budget {
                backend = backend.token_budget(tokens);
            }
            if let Some(rpm) = settings.requests_per_minute {
                backend = backend.requests_per_minute(rpm);
            }
            if let Some(timeout) = settings.request_timeout() {
                backend = backend.request_timeout(timeout);
            }
            builder = builder.backend(Arc::new(backend));
        }

        Ok(builder)
    }

    /// Register a backend. Registration order is the default fallback order.
    pub fn backend(mut self, backend: Arc<dyn AnalysisBackend>) -> Self {
        self.registry.add(backend);
        self
    }

    /// Bound each availability probe (default: 5s).
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.registry = std::mem::take(&mut self.registry).with_probe_timeout(timeout);
        self
    }

    /// Enable the result cache.
    pub fn cache(mut self, store: CacheStore) -> Self {
        self.cache = Some(store);
        self
    }

    /// Disable the result cache.
    pub fn no_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Use a custom rate limiter instead of one derived from each backend's
    /// `requests_per_minute`.
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Backends to try, in order (default: registration order).
    pub fn preferred_order<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_order = names.into_iter().map(Into::into).collect();
        self
    }

    /// Use exactly this backend, no fallback. Still probed before use.
    pub fn force_backend(mut self, name: impl Into<String>) -> Self {
        self.force_backend = Some(name.into());
        self
    }

    /// Per-batch token budget; overrides the selected backend's budget.
    pub fn token_budget(mut self, tokens: usize) -> Self {
        self.token_budget = Some(tokens);
        self
    }

    pub fn packing(mut self, policy: PackingPolicy) -> Self {
        self.packing = policy;
        self
    }

    /// Skip cache reads; fresh results are still written.
    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<Orchestrator> {
        if self.registry.is_empty() {
            return Err(MuninnError::Configuration(
                "no analysis backends registered".to_string(),
            ));
        }
        if self.token_budget == Some(0) {
            return Err(MuninnError::Configuration(
                "token budget must be greater than zero".to_string(),
            ));
        }

        let limiter = self.limiter.unwrap_or_else(|| {
            self.registry
                .iter()
                .fold(RateLimiter::default(), |limiter, backend| {
                    limiter.with_limit(backend.name(), backend.requests_per_minute())
                })
        });

        debug!(
            backends = ?self.registry.names(),
            cache = self.cache.is_some(),
            "built orchestrator"
        );

        Ok(Orchestrator {
            registry: self.registry,
            cache: self.cache,
            limiter,
            retry: RetryExecutor::new(self.retry),
            preferred_order: self.preferred_order,
            force_backend: self.force_backend,
            token_budget: self.token_budget,
            packing: self.packing,
            bypass_cache: self.bypass_cache,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

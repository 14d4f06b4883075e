//! The analysis run loop.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::builder::OrchestratorBuilder;
use crate::aggregate;
use crate::backends::{AnalysisBackend, BackendRegistry, RateLimiter, RetryExecutor};
use crate::batch::{PackingPolicy, pack};
use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::telemetry;
use crate::types::{AnalysisResult, Batch, Prompt};
use crate::{MuninnError, Result};

/// A batch that was skipped, kept in the report so failures are never silent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchWarning {
    /// Position of the batch in the run (0-based).
    pub index: usize,
    pub prompt_count: usize,
    pub error: String,
}

/// Outcome of one [`Orchestrator::run`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRun {
    /// Merged report over every successful batch.
    pub result: AnalysisResult,
    /// Skipped batches, in batch order.
    pub warnings: Vec<BatchWarning>,
    /// Selected backend; `None` when there was nothing to analyse.
    pub backend: Option<String>,
    pub model: Option<String>,
    /// Number of batches the prompts were packed into.
    pub batches: usize,
    /// Batches answered from the cache.
    pub cache_hits: usize,
}

impl AnalysisRun {
    fn empty(date: NaiveDate) -> Self {
        Self {
            result: AnalysisResult::empty(date),
            warnings: Vec::new(),
            backend: None,
            model: None,
            batches: 0,
            cache_hits: 0,
        }
    }
}

/// Drives one analysis run per call to [`run`](Self::run).
///
/// Holds no per-run state; the rate limiter's dispatch history is the only
/// thing carried between runs.
pub struct Orchestrator {
    pub(super) registry: BackendRegistry,
    pub(super) cache: Option<CacheStore>,
    pub(super) limiter: RateLimiter,
    pub(super) retry: RetryExecutor,
    pub(super) preferred_order: Vec<String>,
    pub(super) force_backend: Option<String>,
    pub(super) token_budget: Option<usize>,
    pub(super) packing: PackingPolicy,
    pub(super) bypass_cache: bool,
}

struct BatchOutcome {
    result: AnalysisResult,
    cached: bool,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// The result cache, unless disabled.
    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Analyse `prompts` (chronological, already redacted) into the report
    /// for `date`.
    ///
    /// The backend is selected once, before any cache lookup, because both
    /// the cache key (model id) and the batch budget depend on it.
    ///
    /// # Errors
    ///
    /// - [`MuninnError::NoBackendAvailable`] / [`MuninnError::UnknownBackend`]
    ///   when selection fails
    /// - run-fatal backend errors such as [`MuninnError::AuthenticationFailed`]
    /// - [`MuninnError::AllBatchesFailed`] when no batch produced a result
    ///
    /// Any other batch failure skips that batch and is reported in
    /// [`AnalysisRun::warnings`].
    #[instrument(skip_all, fields(prompts = prompts.len(), date = %date))]
    pub async fn run(&self, prompts: &[Prompt], date: NaiveDate) -> Result<AnalysisRun> {
        if prompts.is_empty() {
            info!("no prompts to analyse");
            return Ok(AnalysisRun::empty(date));
        }

        let backend = self.select_backend().await?;

        if let Some(cache) = &self.cache {
            cache.sweep_expired(cache.ttl()).await;
        }

        let budget = self.token_budget.unwrap_or_else(|| backend.token_budget());
        let batches = pack(prompts, budget, self.packing);
        debug!(batches = batches.len(), budget, "packed prompts");

        let mut results = Vec::with_capacity(batches.len());
        let mut warnings = Vec::new();
        let mut cache_hits = 0;

        for (index, batch) in batches.iter().enumerate() {
            match self.process_batch(&backend, batch).await {
                Ok(outcome) => {
                    let label = if outcome.cached { "cached" } else { "analyzed" };
                    metrics::counter!(telemetry::BATCHES_TOTAL, "outcome" => label).increment(1);
                    if outcome.cached {
                        cache_hits += 1;
                    }
                    results.push(outcome.result);
                }
                Err(e) if e.is_run_fatal() => {
                    warn!(index, error = %e, "batch failed fatally, aborting run");
                    return Err(e);
                }
                Err(e) => {
                    warn!(index, prompts = batch.len(), error = %e, "skipping batch");
                    metrics::counter!(telemetry::BATCHES_TOTAL, "outcome" => "skipped")
                        .increment(1);
                    warnings.push(BatchWarning {
                        index,
                        prompt_count: batch.len(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if results.is_empty() {
            return Err(MuninnError::AllBatchesFailed {
                failed: warnings.len(),
                last_error: warnings
                    .last()
                    .map(|w| w.error.clone())
                    .unwrap_or_default(),
            });
        }

        let result = aggregate::merge(&results, date);
        info!(
            backend = backend.name(),
            batches = batches.len(),
            cache_hits,
            skipped = warnings.len(),
            patterns = result.patterns.len(),
            score = result.stats.overall_score,
            "analysis finished"
        );

        Ok(AnalysisRun {
            result,
            warnings,
            backend: Some(backend.name().to_string()),
            model: Some(backend.model().to_string()),
            batches: batches.len(),
            cache_hits,
        })
    }

    async fn select_backend(&self) -> Result<Arc<dyn AnalysisBackend>> {
        match &self.force_backend {
            Some(name) => self.registry.select_forced(name).await,
            None => self.registry.select(&self.preferred_order).await,
        }
    }

    async fn process_batch(
        &self,
        backend: &Arc<dyn AnalysisBackend>,
        batch: &Batch,
    ) -> Result<BatchOutcome> {
        let model = backend.model();
        let key = CacheKey::derive(model, &batch.texts());

        if !self.bypass_cache {
            if let Some(cache) = &self.cache {
                if let Some(entry) = cache.get(&key, model, batch.len()).await {
                    return Ok(BatchOutcome {
                        result: entry.result,
                        cached: true,
                    });
                }
            }
        }

        let result = self.analyze(backend.as_ref(), &batch.prompts).await?;

        if let Some(cache) = &self.cache {
            let entry = CacheEntry::new(
                result.clone(),
                model,
                batch.len(),
                cache.template_hash().clone(),
            );
            cache.put(&key, &entry).await;
        }

        Ok(BatchOutcome {
            result,
            cached: false,
        })
    }

    /// One paced, retried, time-bounded `analyze` call.
    async fn analyze(
        &self,
        backend: &dyn AnalysisBackend,
        prompts: &[Prompt],
    ) -> Result<AnalysisResult> {
        let name = backend.name();
        let timeout = backend.request_timeout();

        self.retry
            .run(name, "analyze", || async move {
                self.limiter
                    .throttle(name, || async move {
                        let start = Instant::now();
                        let outcome = tokio::time::timeout(timeout, backend.analyze(prompts))
                            .await
                            .unwrap_or_else(|_| {
                                Err(MuninnError::Timeout(format!(
                                    "{name} analyze exceeded {timeout:?}"
                                )))
                            });
                        record_request(name, start, outcome.is_ok());
                        outcome
                    })
                    .await
            })
            .await
    }
}

fn record_request(backend: &str, start: Instant, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "backend" => backend.to_owned(),
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
        "backend" => backend.to_owned(),
    )
    .record(start.elapsed().as_secs_f64());
}

//! Telemetry metric name constants.
//!
//! Centralised metric names for muninn operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `muninn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `backend`: backend identity (e.g. "ollama", "anthropic")
//! - `status`: outcome: "ok" or "error"

/// Total analyze calls dispatched to a backend (one per attempt).
///
/// Labels: `backend`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "muninn_requests_total";

/// Analyze call duration in seconds.
///
/// Labels: `backend`.
pub const REQUEST_DURATION_SECONDS: &str = "muninn_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `backend`, `operation`.
pub const RETRIES_TOTAL: &str = "muninn_retries_total";

/// Total availability probes.
///
/// Labels: `backend`, `status` ("available" | "unavailable").
pub const PROBES_TOTAL: &str = "muninn_probes_total";

/// Total result cache hits.
pub const CACHE_HITS_TOTAL: &str = "muninn_cache_hits_total";

/// Total result cache misses (absent, expired, or mismatched entries).
pub const CACHE_MISSES_TOTAL: &str = "muninn_cache_misses_total";

/// Total cache entries removed by TTL sweeps, corruption or invalidation.
///
/// Labels: `reason` ("expired" | "corrupt" | "invalidated").
pub const CACHE_EVICTIONS_TOTAL: &str = "muninn_cache_evictions_total";

/// Total batches processed by the orchestrator.
///
/// Labels: `outcome` ("cached" | "analyzed" | "skipped").
pub const BATCHES_TOTAL: &str = "muninn_batches_total";

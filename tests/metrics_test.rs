//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use muninn::telemetry;
use muninn::{
    AnalysisBackend, AnalysisResult, BackendRegistry, CacheStore, MuninnError, Orchestrator,
    Prompt, Result, RetryConfig, TemplateHash,
};
use tempfile::TempDir;

// ============================================================================
// Mock backends
// ============================================================================

struct MockBackend {
    name: &'static str,
    available: bool,
}

#[async_trait]
impl AnalysisBackend for MockBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn analyze(&self, prompts: &[Prompt]) -> Result<AnalysisResult> {
        let mut result = AnalysisResult::default();
        result.stats.total_prompts = prompts.len();
        result.stats.overall_score = 6.0;
        Ok(result)
    }
}

/// Fails with a 503 a fixed number of times, then succeeds.
struct FlakyBackend {
    failures: AtomicU32,
}

#[async_trait]
impl AnalysisBackend for FlakyBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn analyze(&self, prompts: &[Prompt]) -> Result<AnalysisResult> {
        if self.failures.load(Ordering::Relaxed) > 0 {
            self.failures.fetch_sub(1, Ordering::Relaxed);
            return Err(MuninnError::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        let mut result = AnalysisResult::default();
        result.stats.total_prompts = prompts.len();
        Ok(result)
    }
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Sum counter values for `name` carrying the label `label=value`.
fn counter_with_label(snapshot: &SnapshotVec, name: &str, label: &str, value: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter
                && key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label && l.value() == value)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

fn prompts(texts: &[&str]) -> Vec<Prompt> {
    let ts = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    texts.iter().map(|t| Prompt::new(*t, ts, "s1")).collect()
}

// ============================================================================
// Tests
// ============================================================================

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn successful_run_records_request_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let orchestrator = Orchestrator::builder()
                    .backend(Arc::new(MockBackend {
                        name: "test-backend",
                        available: true,
                    }))
                    .token_budget(1)
                    .build()?;
                orchestrator.run(&prompts(&["a", "b"]), day()).await
            })
        })
    });
    assert!(result.is_ok());

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 2);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::REQUESTS_TOTAL, "backend", "test-backend"),
        2
    );
    assert!(
        has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS),
        "expected a duration histogram entry"
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::BATCHES_TOTAL, "outcome", "analyzed"),
        2
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn probes_record_availability() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let registry = BackendRegistry::new()
                    .with(Arc::new(MockBackend {
                        name: "down",
                        available: false,
                    }))
                    .with(Arc::new(MockBackend {
                        name: "up",
                        available: true,
                    }));
                registry.probe_all().await
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(counter_total(&snapshot, telemetry::PROBES_TOTAL), 2);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::PROBES_TOTAL, "status", "unavailable"),
        1
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::PROBES_TOTAL, "backend", "up"),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn retries_are_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let orchestrator = Orchestrator::builder()
                    .backend(Arc::new(FlakyBackend {
                        failures: AtomicU32::new(2),
                    }))
                    .retry(
                        RetryConfig::new()
                            .max_attempts(3)
                            .initial_delay(Duration::from_millis(1)),
                    )
                    .build()?;
                orchestrator.run(&prompts(&["a"]), day()).await
            })
        })
    });
    assert!(result.is_ok());

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(counter_total(&snapshot, telemetry::RETRIES_TOTAL), 2);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::REQUESTS_TOTAL, "status", "error"),
        2
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::REQUESTS_TOTAL, "status", "ok"),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn cache_hits_and_misses_are_counted() {
    let dir = TempDir::new().unwrap();
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let orchestrator = Orchestrator::builder()
                    .backend(Arc::new(MockBackend {
                        name: "test-backend",
                        available: true,
                    }))
                    .cache(CacheStore::new(
                        dir.path(),
                        TemplateHash::of("metrics template"),
                        Duration::from_secs(3600),
                    ))
                    .build()?;
                let input = prompts(&["a"]);
                orchestrator.run(&input, day()).await?;
                orchestrator.run(&input, day()).await
            })
        })
    });
    assert!(result.is_ok());

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 1);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::BATCHES_TOTAL, "outcome", "cached"),
        1
    );
}

#[tokio::test]
async fn no_recorder_does_not_panic() {
    // Without a recorder installed, metrics calls are no-ops.
    let orchestrator = Orchestrator::builder()
        .backend(Arc::new(MockBackend {
            name: "test-backend",
            available: true,
        }))
        .build()
        .unwrap();

    let run = orchestrator.run(&prompts(&["a"]), day()).await;
    assert!(run.is_ok());
}

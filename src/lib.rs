//! Muninn - prompt-quality analysis over interchangeable LLM backends
//!
//! Muninn takes a day's worth of prompts written to an AI coding assistant,
//! packs them into token-budgeted batches, sends each batch to the first
//! available analysis backend (a local Ollama model or a hosted API) and
//! merges the per-batch findings into one report. Batch results are cached
//! on disk, so re-running over the same prompts costs nothing.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chrono::{NaiveDate, Utc};
//! use muninn::{CacheStore, OllamaBackend, Orchestrator, Prompt, template_hash};
//!
//! #[tokio::main]
//! async fn main() -> muninn::Result<()> {
//!     let orchestrator = Orchestrator::builder()
//!         .backend(Arc::new(OllamaBackend::new("llama3.1:8b")?))
//!         .cache(CacheStore::new(
//!             CacheStore::default_root(),
//!             template_hash(),
//!             muninn::cache::DEFAULT_TTL,
//!         ))
//!         .build()?;
//!
//!     let prompts = vec![
//!         Prompt::new("fix bug", Utc::now(), "session-1"),
//!         Prompt::new("add tests", Utc::now(), "session-1"),
//!     ];
//!     let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
//!     let run = orchestrator.run(&prompts, date).await?;
//!
//!     if let Some(tip) = &run.result.top_suggestion {
//!         println!("{tip}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod backends;
pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use error::{ErrorClass, MuninnError, Result};
pub use pipeline::{AnalysisRun, BatchWarning, Orchestrator, OrchestratorBuilder};

pub use backends::{
    AnalysisBackend, AnthropicBackend, BackendRegistry, BackendStatus, OllamaBackend,
    OpenAiBackend, RateLimiter, RetryConfig, RetryExecutor, template_hash,
};
pub use batch::{PackingPolicy, estimate_tokens, pack};
pub use cache::{CacheEntry, CacheKey, CacheStore, TemplateHash};
pub use config::{Config, Secrets};
pub use types::{AnalysisResult, Batch, Pattern, Prompt, Severity, SummaryStats};
pub use version::{PKG_VERSION, version_string};

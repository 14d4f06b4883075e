//! Analysis backends and the call-side machinery around them.
//!
//! - [`AnalysisBackend`]: the trait every provider implements
//! - [`OllamaBackend`], [`AnthropicBackend`], [`OpenAiBackend`]: concrete providers
//! - [`BackendRegistry`]: availability probing and fallback order
//! - [`RetryExecutor`]: bounded exponential backoff for transient failures
//! - [`RateLimiter`]: per-backend request pacing

pub mod anthropic;
mod http;
pub mod ollama;
pub mod openai;
pub mod rate_limit;
pub mod registry;
pub mod response;
pub mod retry;
pub mod template;
pub mod traits;

pub use anthropic::{AnthropicBackend, DEFAULT_ANTHROPIC_MODEL, DEFAULT_ANTHROPIC_URL};
pub use ollama::{DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL, OllamaBackend};
pub use openai::{DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL, OpenAiBackend};
pub use rate_limit::RateLimiter;
pub use registry::{BackendRegistry, BackendStatus, DEFAULT_PROBE_TIMEOUT};
pub use response::{MAX_EXAMPLES_PER_PATTERN, MAX_SCORE, parse_analysis};
pub use retry::{RetryConfig, RetryExecutor};
pub use template::{INSTRUCTION_TEMPLATE, render, template_hash};
pub use traits::{AnalysisBackend, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TOKEN_BUDGET};

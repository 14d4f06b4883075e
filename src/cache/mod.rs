//! Result caching subsystem.
//!
//! - [`key`]: [`CacheKey`] derivation (order-sensitive SHA-256 over the
//!   backend model id and the batch's prompt texts) and [`TemplateHash`].
//! - [`store`]: [`CacheStore`], the on-disk, TTL-bound, atomically written
//!   store of batch results, wiped wholesale when the instruction template
//!   changes.
//!
//! A cache hit skips rate limiting and the network call; the orchestrator
//! only calls the backend for misses.

pub mod key;
pub mod store;

pub use key::{CacheKey, PROMPT_DELIMITER, TemplateHash};
pub use store::{CacheEntry, CacheStats, CacheStore, DEFAULT_TTL};

//! End-to-end analysis runs.
//!
//! [`Orchestrator`] wires the pieces together for one run:
//!
//! ```text
//! prompts ──► select backend ──► pack batches ──► per batch:
//!                                                  cache hit? ──► reuse
//!                                                  miss ──► rate limit ──► retry(analyze) ──► cache put
//!                                            ──► merge ──► AnalysisRun
//! ```

mod builder;
mod orchestrator;

pub use builder::OrchestratorBuilder;
pub use orchestrator::{AnalysisRun, BatchWarning, Orchestrator};

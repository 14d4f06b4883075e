//! Public types for the Muninn API.

mod analysis;
mod prompt;

pub use analysis::{AnalysisResult, Pattern, Severity, SummaryStats};
pub use prompt::{Batch, Prompt};

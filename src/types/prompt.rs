//! Prompt records and batches

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single user prompt extracted from a log source.
///
/// Text is already redacted by the time it reaches muninn. Records arrive
/// sorted by timestamp and that order is preserved through batching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
}

impl Prompt {
    pub fn new(
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            timestamp,
            source_id: source_id.into(),
        }
    }
}

/// An order-preserving group of prompts sent to one backend call.
///
/// Built by [`pack()`](crate::batch::pack) and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub prompts: Vec<Prompt>,
    /// Heuristic token estimate, see [`estimate_tokens()`](crate::batch::estimate_tokens).
    pub estimated_tokens: usize,
}

impl Batch {
    /// Number of prompts in the batch.
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    /// Whether the batch holds no prompts.
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Prompt texts in batch order.
    pub fn texts(&self) -> Vec<&str> {
        self.prompts.iter().map(|p| p.text.as_str()).collect()
    }
}

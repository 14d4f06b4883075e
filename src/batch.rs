//! Token-budgeted batching of prompts.
//!
//! [`pack()`] groups an ordered prompt sequence greedily: prompts are added
//! to the current batch while the batch estimate plus the next prompt's
//! estimate stays within the budget, otherwise a new batch starts.
//!
//! A prompt whose own estimate exceeds the budget still gets a batch of its
//! own. It is never split or dropped; if the backend rejects it, that batch
//! fails and the orchestrator skips it.

use serde::Deserialize;

use crate::types::{Batch, Prompt};

/// Rough characters-per-token ratio for English prose and code.
const CHARS_PER_TOKEN: usize = 4;

/// Fixed per-prompt overhead for numbering and separators in the rendered
/// instruction.
const PROMPT_OVERHEAD_TOKENS: usize = 4;

/// Order in which prompts are fed to the packer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackingPolicy {
    /// Keep input (chronological) order.
    #[default]
    Chronological,
    /// Largest prompts first. Stable, so equal estimates keep input order.
    Priority,
}

/// Cheap token estimate for a prompt text.
///
/// Proportional to the character count, not a real tokenizer. Expect
/// over- and under-estimates in the order of tens of percent.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN) + PROMPT_OVERHEAD_TOKENS
}

/// Partition `prompts` into batches of at most `max_tokens_per_batch`
/// estimated tokens.
///
/// Concatenating the returned batches reproduces the (policy-ordered) input.
/// The only batches over budget are single-prompt batches whose prompt alone
/// exceeds it.
pub fn pack(prompts: &[Prompt], max_tokens_per_batch: usize, policy: PackingPolicy) -> Vec<Batch> {
    let mut ordered: Vec<(usize, &Prompt)> =
        prompts.iter().map(|p| (estimate_tokens(&p.text), p)).collect();

    if policy == PackingPolicy::Priority {
        // sort_by is stable
        ordered.sort_by(|(a, _), (b, _)| b.cmp(a));
    }

    let mut batches = Vec::new();
    let mut current: Vec<Prompt> = Vec::new();
    let mut current_tokens = 0usize;

    for (tokens, prompt) in ordered {
        if !current.is_empty() && current_tokens + tokens > max_tokens_per_batch {
            batches.push(Batch {
                prompts: std::mem::take(&mut current),
                estimated_tokens: current_tokens,
            });
            current_tokens = 0;
        }
        current.push(prompt.clone());
        current_tokens += tokens;
    }

    if !current.is_empty() {
        batches.push(Batch {
            prompts: current,
            estimated_tokens: current_tokens,
        });
    }

    batches
}

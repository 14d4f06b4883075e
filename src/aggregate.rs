//! Merge per-batch results into one report.
//!
//! Patterns are merged by id:
//! - `frequency` is summed (each batch counts its own prompts, so the sum is
//!   already weighted by batch size; [`Pattern::rate`] gives the share)
//! - `severity` is the maximum seen
//! - `examples` are concatenated in batch order, de-duplicated, capped at
//!   [`MAX_EXAMPLES_PER_PATTERN`]
//! - `suggestion` comes from the most severe occurrence (first one on ties)
//!
//! `overall_score` is the prompt-weighted mean of batch scores. Patterns are
//! ordered by severity, then frequency, then id, and `top_suggestion` is the
//! suggestion of the first pattern that has one.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;

use crate::backends::MAX_EXAMPLES_PER_PATTERN;
use crate::types::{AnalysisResult, Pattern, SummaryStats};

/// Combine `results` (in batch order) into the report for `date`.
pub fn merge(results: &[AnalysisResult], date: NaiveDate) -> AnalysisResult {
    let mut merged: Vec<Pattern> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    // severity of the occurrence each merged suggestion was taken from
    let mut suggestion_severity = Vec::new();

    for result in results {
        for pattern in &result.patterns {
            match index.get(&pattern.id) {
                Some(&i) => {
                    let target = &mut merged[i];
                    target.frequency = target.frequency.saturating_add(pattern.frequency);
                    target.severity = target.severity.max(pattern.severity);
                    if target.name.is_empty() {
                        target.name = pattern.name.clone();
                    }
                    for example in &pattern.examples {
                        if target.examples.len() >= MAX_EXAMPLES_PER_PATTERN {
                            break;
                        }
                        if !target.examples.contains(example) {
                            target.examples.push(example.clone());
                        }
                    }
                    let replace = !pattern.suggestion.is_empty()
                        && (target.suggestion.is_empty()
                            || pattern.severity > suggestion_severity[i]);
                    if replace {
                        target.suggestion = pattern.suggestion.clone();
                        suggestion_severity[i] = pattern.severity;
                    }
                }
                None => {
                    let mut first = pattern.clone();
                    first.examples = Vec::with_capacity(MAX_EXAMPLES_PER_PATTERN);
                    for example in &pattern.examples {
                        if first.examples.len() >= MAX_EXAMPLES_PER_PATTERN {
                            break;
                        }
                        if !first.examples.contains(example) {
                            first.examples.push(example.clone());
                        }
                    }
                    index.insert(first.id.clone(), merged.len());
                    suggestion_severity.push(first.severity);
                    merged.push(first);
                }
            }
        }
    }

    merged.sort_by(rank);

    let top_suggestion = merged
        .iter()
        .find(|p| !p.suggestion.trim().is_empty())
        .map(|p| p.suggestion.clone())
        .or_else(|| results.iter().find_map(|r| r.top_suggestion.clone()));

    AnalysisResult {
        date: Some(date),
        patterns: merged,
        stats: SummaryStats {
            total_prompts: results.iter().map(|r| r.stats.total_prompts).sum(),
            issues_found: results.iter().map(|r| r.stats.issues_found).sum(),
            overall_score: weighted_score(results),
        },
        top_suggestion,
    }
}

/// Most important first: severity, then frequency, then id for stability.
fn rank(a: &Pattern, b: &Pattern) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| b.frequency.cmp(&a.frequency))
        .then_with(|| a.id.cmp(&b.id))
}

/// Prompt-weighted mean of batch scores.
///
/// Falls back to the plain mean when no batch reports any prompts, and to
/// `0.0` when there are no batches.
fn weighted_score(results: &[AnalysisResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let total: usize = results.iter().map(|r| r.stats.total_prompts).sum();
    if total == 0 {
        let sum: f64 = results.iter().map(|r| r.stats.overall_score).sum();
        return sum / results.len() as f64;
    }
    results
        .iter()
        .map(|r| r.stats.overall_score * r.stats.total_prompts as f64)
        .sum::<f64>()
        / total as f64
}

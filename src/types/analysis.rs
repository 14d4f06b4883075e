//! Analysis results returned by backends and produced by aggregation

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How much a detected pattern hurts prompt quality.
///
/// Ordered: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Parse a backend-supplied severity label (case-insensitive).
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" | "moderate" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

/// A named pattern detected across a set of prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Stable identifier, e.g. `missing-context`. Merge key across batches.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Number of prompts exhibiting the pattern.
    pub frequency: u32,
    pub severity: Severity,
    /// Example prompt excerpts.
    #[serde(default)]
    pub examples: Vec<String>,
    /// Suggested rewrite or habit change.
    pub suggestion: String,
}

impl Pattern {
    /// Share of `total_prompts` exhibiting this pattern (0.0 when empty).
    pub fn rate(&self, total_prompts: usize) -> f64 {
        if total_prompts == 0 {
            0.0
        } else {
            f64::from(self.frequency) / total_prompts as f64
        }
    }
}

/// Summary statistics for one analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_prompts: usize,
    pub issues_found: usize,
    /// Overall prompt quality, 0 (poor) to 10 (excellent).
    pub overall_score: f64,
}

/// Structured output of one backend call, a cache hit, or a merged report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Report date; set on merged results only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    pub stats: SummaryStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_suggestion: Option<String>,
}

impl AnalysisResult {
    /// An empty result for `date` (no prompts, no patterns).
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Self::default()
        }
    }

    /// Look up a pattern by id.
    pub fn pattern(&self, id: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == id)
    }
}

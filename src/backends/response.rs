//! Schema validation for backend payloads.
//!
//! Backends return free text that should contain one JSON object. It is
//! parsed against an explicit raw schema and validated before becoming an
//! [`AnalysisResult`]; any failure is [`MuninnError::InvalidResponse`],
//! which is fatal for that batch and never retried.

use serde::Deserialize;

use crate::types::{AnalysisResult, Pattern, Severity, SummaryStats};
use crate::{MuninnError, Result};

/// Examples kept per pattern, both per batch and after merging.
pub const MAX_EXAMPLES_PER_PATTERN: usize = 3;

/// Highest valid `overall_score`.
pub const MAX_SCORE: f64 = 10.0;

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    patterns: Vec<RawPattern>,
    stats: RawStats,
    #[serde(default)]
    top_suggestion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPattern {
    id: String,
    #[serde(default)]
    name: Option<String>,
    frequency: i64,
    severity: String,
    #[serde(default)]
    examples: Vec<String>,
    #[serde(default)]
    suggestion: String,
}

#[derive(Debug, Deserialize)]
struct RawStats {
    total_prompts: i64,
    issues_found: i64,
    overall_score: f64,
}

/// Parse and validate a backend's text output.
///
/// `expected_prompts` is the batch size. The payload's `total_prompts` must
/// not exceed it and is then replaced by it, since models under-count;
/// pattern frequencies are clamped to it.
pub fn parse_analysis(raw: &str, expected_prompts: usize) -> Result<AnalysisResult> {
    let json = extract_json_object(raw)
        .ok_or_else(|| MuninnError::InvalidResponse("no JSON object in backend output".into()))?;
    let parsed: RawAnalysis = serde_json::from_str(json)
        .map_err(|e| MuninnError::InvalidResponse(format!("schema mismatch: {e}")))?;
    validate(parsed, expected_prompts)
}

fn validate(raw: RawAnalysis, expected_prompts: usize) -> Result<AnalysisResult> {
    let stats = &raw.stats;
    if !stats.overall_score.is_finite() || !(0.0..=MAX_SCORE).contains(&stats.overall_score) {
        return Err(MuninnError::InvalidResponse(format!(
            "overall_score {} outside 0-10",
            stats.overall_score
        )));
    }
    let total_prompts = non_negative("total_prompts", stats.total_prompts)?;
    let issues_found = non_negative("issues_found", stats.issues_found)?;
    if total_prompts > expected_prompts {
        return Err(MuninnError::InvalidResponse(format!(
            "total_prompts {total_prompts} exceeds batch size {expected_prompts}"
        )));
    }

    let mut patterns = Vec::with_capacity(raw.patterns.len());
    for p in raw.patterns {
        let id = p.id.trim().to_string();
        if id.is_empty() {
            return Err(MuninnError::InvalidResponse("pattern with empty id".into()));
        }
        let severity = Severity::parse(&p.severity).ok_or_else(|| {
            MuninnError::InvalidResponse(format!("pattern {id}: unknown severity {:?}", p.severity))
        })?;
        let frequency = non_negative("frequency", p.frequency)?.min(expected_prompts);
        let frequency = u32::try_from(frequency).map_err(|_| {
            MuninnError::InvalidResponse(format!("pattern {id}: frequency out of range"))
        })?;
        let mut examples = p.examples;
        examples.retain(|e| !e.trim().is_empty());
        examples.truncate(MAX_EXAMPLES_PER_PATTERN);

        patterns.push(Pattern {
            name: p
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| id.clone()),
            id,
            frequency,
            severity,
            examples,
            suggestion: p.suggestion,
        });
    }

    Ok(AnalysisResult {
        date: None,
        patterns,
        stats: SummaryStats {
            total_prompts: expected_prompts,
            issues_found,
            overall_score: stats.overall_score,
        },
        top_suggestion: raw.top_suggestion.filter(|s| !s.trim().is_empty()),
    })
}

fn non_negative(field: &str, value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| MuninnError::InvalidResponse(format!("{field} must be non-negative, got {value}")))
}

/// Locate the outermost JSON object in model output.
///
/// Tolerates markdown code fences and chatter before or after the object.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "patterns": [
            {"id": "missing-context", "name": "Missing context", "frequency": 2,
             "severity": "High", "examples": ["fix it", "", "why broken", "a", "b"],
             "suggestion": "Say which file"}
        ],
        "stats": {"total_prompts": 5, "issues_found": 2, "overall_score": 6.5},
        "top_suggestion": "Say which file"
    }"#;

    #[test]
    fn parses_valid_payload() {
        let result = parse_analysis(VALID, 5).unwrap();
        assert_eq!(result.stats.total_prompts, 5);
        let pattern = result.pattern("missing-context").unwrap();
        assert_eq!(pattern.severity, Severity::High);
        assert_eq!(pattern.examples, vec!["fix it", "why broken", "a"]);
    }

    #[test]
    fn tolerates_code_fences() {
        let fenced = format!("Here you go:\n```json\n{VALID}\n```\n");
        assert!(parse_analysis(&fenced, 5).is_ok());
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_analysis("I cannot help with that.", 5).unwrap_err();
        assert!(matches!(err, MuninnError::InvalidResponse(_)));
    }

    #[test]
    fn rejects_score_out_of_range() {
        let raw = r#"{"stats": {"total_prompts": 1, "issues_found": 0, "overall_score": 11}}"#;
        assert!(matches!(parse_analysis(raw, 1), Err(MuninnError::InvalidResponse(_))));
    }

    #[test]
    fn rejects_unknown_severity() {
        let raw = r#"{"patterns": [{"id": "x", "frequency": 1, "severity": "extreme"}],
                      "stats": {"total_prompts": 1, "issues_found": 1, "overall_score": 5}}"#;
        assert!(matches!(parse_analysis(raw, 1), Err(MuninnError::InvalidResponse(_))));
    }

    #[test]
    fn rejects_negative_counts() {
        let raw = r#"{"stats": {"total_prompts": -1, "issues_found": 0, "overall_score": 5}}"#;
        assert!(parse_analysis(raw, 1).is_err());
    }

    #[test]
    fn total_prompts_normalised_to_batch_size() {
        let raw = r#"{"patterns": [{"id": "x", "frequency": 40, "severity": "low"}],
                      "stats": {"total_prompts": 3, "issues_found": 1, "overall_score": 5}}"#;
        let result = parse_analysis(raw, 4).unwrap();
        assert_eq!(result.stats.total_prompts, 4);
        assert_eq!(result.patterns[0].frequency, 4);
        assert_eq!(result.patterns[0].name, "x");
    }

    #[test]
    fn rejects_overcounted_prompts() {
        let raw = r#"{"stats": {"total_prompts": 9, "issues_found": 0, "overall_score": 5}}"#;
        assert!(parse_analysis(raw, 2).is_err());
    }

    #[test]
    fn invalid_response_is_fatal() {
        let err = parse_analysis("nope", 1).unwrap_err();
        assert!(!err.is_transient());
    }
}

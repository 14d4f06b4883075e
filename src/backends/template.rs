//! The fixed instruction template sent to every backend.
//!
//! Any edit to [`INSTRUCTION_TEMPLATE`] changes [`template_hash()`], which
//! invalidates the whole result cache on the next run.

use std::sync::OnceLock;

use crate::cache::TemplateHash;
use crate::types::Prompt;

/// Placeholder replaced by the numbered prompt list.
const PROMPTS_PLACEHOLDER: &str = "{{PROMPTS}}";

/// Instructions for the analysis model.
pub const INSTRUCTION_TEMPLATE: &str = r#"You review prompts that a developer wrote to an AI coding assistant and report recurring quality problems.

Analyse the prompts below. Look for patterns such as missing context, vague goals, missing acceptance criteria, overly long multi-task prompts, missing error output, and unclear file references.

Respond with a single JSON object and nothing else, using exactly this schema:
{
  "patterns": [
    {
      "id": "kebab-case-identifier",
      "name": "Short human readable name",
      "frequency": <number of prompts showing this pattern>,
      "severity": "low" | "medium" | "high",
      "examples": ["short excerpt from an affected prompt"],
      "suggestion": "How to rewrite prompts to avoid this"
    }
  ],
  "stats": {
    "total_prompts": <number of prompts analysed>,
    "issues_found": <total number of issues>,
    "overall_score": <0-10, 10 = excellent prompts>
  },
  "top_suggestion": "The single most useful improvement"
}

Use stable ids so the same problem gets the same id every time. Keep at most 3 examples per pattern.

Prompts:
{{PROMPTS}}"#;

/// Digest of [`INSTRUCTION_TEMPLATE`], computed once per process.
pub fn template_hash() -> TemplateHash {
    static HASH: OnceLock<TemplateHash> = OnceLock::new();
    HASH.get_or_init(|| TemplateHash::of(INSTRUCTION_TEMPLATE))
        .clone()
}

/// Render the full instruction for one batch.
///
/// Prompts are numbered from 1 in batch order, each prefixed by its
/// timestamp.
pub fn render(prompts: &[Prompt]) -> String {
    let list = prompts
        .iter()
        .enumerate()
        .map(|(i, p)| {
            format!(
                "{}. [{}] {}",
                i + 1,
                p.timestamp.format("%Y-%m-%d %H:%M"),
                p.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    INSTRUCTION_TEMPLATE.replace(PROMPTS_PLACEHOLDER, &list)
}

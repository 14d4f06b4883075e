//! Content-addressed cache keys and the instruction template digest.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separator placed between prompt texts before hashing.
///
/// Multi-character with control bytes so that no realistic prompt text can
/// shift a boundary and collide with a different split of the same bytes.
pub const PROMPT_DELIMITER: &str = "\u{1e}\u{1f}<muninn:prompt-boundary>\u{1f}\u{1e}";

fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

/// Order-sensitive digest of `(backend model id, prompt texts)`.
///
/// The same texts in a different order produce a different key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a batch analysed by `model`.
    pub fn derive(model: &str, texts: &[&str]) -> Self {
        let material = format!("{model}:{}", texts.join(PROMPT_DELIMITER));
        Self(sha256_hex(material.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest of the fixed instruction template sent to every backend.
///
/// Persisted next to the cache; a change wipes every cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateHash(String);

impl TemplateHash {
    /// Hash a template text.
    pub fn of(template: &str) -> Self {
        Self(sha256_hex(template.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_deterministic() {
        let k1 = CacheKey::derive("model-a", &["fix bug", "add tests"]);
        let k2 = CacheKey::derive("model-a", &["fix bug", "add tests"]);
        assert_eq!(k1, k2);
        assert_eq!(k1.as_str().len(), 64);
    }

    #[test]
    fn cache_key_order_matters() {
        let k1 = CacheKey::derive("model-a", &["fix bug", "add tests"]);
        let k2 = CacheKey::derive("model-a", &["add tests", "fix bug"]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn cache_key_differs_on_model() {
        let k1 = CacheKey::derive("model-a", &["hello"]);
        let k2 = CacheKey::derive("model-b", &["hello"]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn cache_key_boundaries_matter() {
        let k1 = CacheKey::derive("m", &["ab", "c"]);
        let k2 = CacheKey::derive("m", &["a", "bc"]);
        assert_ne!(k1, k2);
    }

    #[test]
    fn template_hash_tracks_text() {
        assert_eq!(TemplateHash::of("v1"), TemplateHash::of("v1"));
        assert_ne!(TemplateHash::of("v1"), TemplateHash::of("v2"));
    }
}

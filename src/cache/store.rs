//! On-disk result cache.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   meta.json             { "template_hash": "...", "updated_at": "..." }
//!   entries/<key>.json    one CacheEntry per batch key
//! ```
//!
//! Every file is written to a sibling temporary path and renamed over the
//! final one, so readers never see a partial file and concurrent writers of
//! the same key resolve to "last rename wins".
//!
//! # Failure policy
//!
//! Cache problems never reach the caller. Read failures, parse failures and
//! write failures are logged and degrade to a miss or a no-op write.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::key::{CacheKey, TemplateHash};
use crate::telemetry;
use crate::types::AnalysisResult;
use crate::{MuninnError, Result};

const ENTRIES_DIR: &str = "entries";
const META_FILE: &str = "meta.json";
const ENTRY_EXT: &str = "json";
const TMP_EXT: &str = "tmp";

/// Default entry lifetime: 7 days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Temp files older than this are leftovers of interrupted writes.
const STALE_TMP_AGE: Duration = Duration::from_secs(60 * 60);

/// Distinguishes temp files of concurrent writers within one process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A cached batch result plus the data needed to validate it on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: AnalysisResult,
    pub cached_at: DateTime<Utc>,
    pub backend_model_id: String,
    pub prompt_count: usize,
    pub template_hash: TemplateHash,
}

impl CacheEntry {
    /// Stamp a fresh entry with the current time.
    pub fn new(
        result: AnalysisResult,
        backend_model_id: impl Into<String>,
        prompt_count: usize,
        template_hash: TemplateHash,
    ) -> Self {
        Self {
            result,
            cached_at: Utc::now(),
            backend_model_id: backend_model_id.into(),
            prompt_count,
            template_hash,
        }
    }

    /// Whether the entry is older than `ttl` at `now`.
    ///
    /// Entries stamped in the future (clock skew) count as fresh.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.cached_at).to_std() {
            Ok(age) => age > ttl,
            Err(_) => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    template_hash: TemplateHash,
    updated_at: DateTime<Utc>,
}

/// Entry count and on-disk size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
}

/// Content-addressed, TTL-bound store of batch results.
///
/// Constructed with an explicit root so independent runs (and tests) never
/// share state unless they share a directory.
pub struct CacheStore {
    root: PathBuf,
    template_hash: TemplateHash,
    ttl: Duration,
}

impl CacheStore {
    /// Open (lazily) a store under `root` for the current template.
    ///
    /// Nothing touches the disk until the first operation.
    pub fn new(root: impl Into<PathBuf>, template_hash: TemplateHash, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            template_hash,
            ttl,
        }
    }

    /// Default location: `<cache dir>/muninn`, e.g. `~/.cache/muninn`.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("muninn")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn template_hash(&self) -> &TemplateHash {
        &self.template_hash
    }

    fn entries_dir(&self) -> PathBuf {
        self.root.join(ENTRIES_DIR)
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILE)
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.entries_dir()
            .join(format!("{}.{ENTRY_EXT}", key.as_str()))
    }

    /// Look up a valid entry for `key`.
    ///
    /// Returns `None` when the entry is absent, older than the TTL, produced
    /// by another model, covers a different number of prompts, or cannot be
    /// read. Corrupt files are removed on the way.
    pub async fn get(
        &self,
        key: &CacheKey,
        backend_model_id: &str,
        prompt_count: usize,
    ) -> Option<CacheEntry> {
        if let Err(e) = self.ensure_template().await {
            warn!(error = %e, "cache template check failed, treating as miss");
            return self.miss();
        }

        let path = self.entry_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return self.miss(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache entry");
                return self.miss();
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache entry, removing");
                self.remove_file(&path, "corrupt").await;
                return self.miss();
            }
        };

        if entry.is_expired(self.ttl, Utc::now()) {
            debug!(key = %key, "cache entry expired");
            return self.miss();
        }
        if entry.backend_model_id != backend_model_id {
            debug!(key = %key, cached = %entry.backend_model_id, requested = backend_model_id, "cache entry model mismatch");
            return self.miss();
        }
        if entry.prompt_count != prompt_count {
            debug!(key = %key, cached = entry.prompt_count, requested = prompt_count, "cache entry size mismatch");
            return self.miss();
        }
        if entry.template_hash != self.template_hash {
            debug!(key = %key, "cache entry from another template");
            return self.miss();
        }

        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        debug!(key = %key, "cache hit");
        Some(entry)
    }

    fn miss(&self) -> Option<CacheEntry> {
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        None
    }

    /// Store `entry` under `key`, replacing any previous entry.
    ///
    /// Returns `false` (after logging) if the write failed.
    pub async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> bool {
        match self.try_put(key, entry).await {
            Ok(()) => {
                debug!(key = %key, prompts = entry.prompt_count, "cached batch result");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to write cache entry");
                false
            }
        }
    }

    async fn try_put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        self.ensure_template().await?;
        let json = serde_json::to_vec_pretty(entry)?;
        write_atomic(&self.entry_path(key), &json).await
    }

    /// Delete every entry. Returns the number removed.
    pub async fn invalidate_all(&self) -> usize {
        let paths = self.list_entries().await;
        let mut removed = 0;
        for path in paths {
            if self.remove_file(&path, "invalidated").await {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, root = %self.root.display(), "invalidated result cache");
        }
        removed
    }

    /// Remove entries older than `ttl` and entries that fail to parse.
    ///
    /// Leftover temp files from interrupted writes are removed too but not
    /// counted. Returns the number of entries removed.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let mut removed = 0;

        for path in self.list_entries().await {
            let reason = match tokio::fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<CacheEntry>(&content) {
                    Ok(entry) if entry.is_expired(ttl, now) => Some("expired"),
                    Ok(_) => None,
                    Err(_) => Some("corrupt"),
                },
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read cache entry during sweep");
                    None
                }
            };
            if let Some(reason) = reason {
                if self.remove_file(&path, reason).await {
                    removed += 1;
                }
            }
        }

        self.remove_stale_tmp_files().await;
        if removed > 0 {
            info!(removed, "swept result cache");
        }
        removed
    }

    /// Count entries and their total size.
    pub async fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for path in self.list_entries().await {
            stats.entries += 1;
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                stats.bytes += meta.len();
            }
        }
        stats
    }

    /// Wipe the store if it was built for another instruction template.
    ///
    /// Runs before every read and write. A missing or unreadable metadata
    /// file counts as a mismatch, since its entries cannot be trusted.
    async fn ensure_template(&self) -> Result<()> {
        let meta_path = self.meta_path();
        let persisted = match tokio::fs::read_to_string(&meta_path).await {
            Ok(content) => serde_json::from_str::<CacheMeta>(&content)
                .map(|m| m.template_hash)
                .ok(),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                return Err(MuninnError::Cache(format!(
                    "failed to read {}: {e}",
                    meta_path.display()
                )));
            }
        };

        if persisted.as_ref() == Some(&self.template_hash) {
            return Ok(());
        }

        if let Some(old) = &persisted {
            info!(old = %old, new = %self.template_hash, "instruction template changed, invalidating cache");
        }
        self.invalidate_all().await;

        let meta = CacheMeta {
            template_hash: self.template_hash.clone(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&meta)?;
        write_atomic(&meta_path, &json).await
    }

    /// Paths of all `*.json` files in the entries directory.
    async fn list_entries(&self) -> Vec<PathBuf> {
        list_with_extension(&self.entries_dir(), ENTRY_EXT).await
    }

    async fn remove_stale_tmp_files(&self) {
        // Entry temp files live in `entries/`, metadata temp files in the root
        let mut leftovers = list_with_extension(&self.entries_dir(), TMP_EXT).await;
        leftovers.extend(list_with_extension(&self.root, TMP_EXT).await);
        for path in leftovers {
            // Young temp files may belong to a writer that is still running
            let stale = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => modified
                    .elapsed()
                    .map(|age| age > STALE_TMP_AGE)
                    .unwrap_or(false),
                Err(_) => false,
            };
            if !stale {
                continue;
            }
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove temp file");
                }
            }
        }
    }

    async fn remove_file(&self, path: &Path, reason: &'static str) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => reason)
                    .increment(1);
                true
            }
            // Another process got there first
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, reason, "failed to remove cache file");
                false
            }
        }
    }
}

/// Paths of files in `dir` with extension `ext`, sorted.
async fn list_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to list cache entries");
            return Vec::new();
        }
    };

    let mut paths = Vec::new();
    loop {
        match read_dir.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some(ext) {
                    paths.push(path);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to list cache entries");
                break;
            }
        }
    }
    paths.sort();
    paths
}

/// Write `bytes` to `path` via a sibling temp file and a rename.
///
/// The rename is the only visible mutation; a crash before it leaves at
/// most a stray `*.tmp` file that [`CacheStore::sweep_expired()`] cleans up.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            MuninnError::Cache(format!("failed to create {}: {e}", parent.display()))
        })?;
    }

    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_path = path.with_extension(format!("{}.{seq}.{TMP_EXT}", std::process::id()));

    if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
        return Err(MuninnError::Cache(format!(
            "failed to write {}: {e}",
            tmp_path.display()
        )));
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
            debug!(path = %tmp_path.display(), error = %cleanup, "failed to remove temp file after failed rename");
        }
        return Err(MuninnError::Cache(format!(
            "failed to rename {} → {}: {e}",
            tmp_path.display(),
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_at(cached_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            result: AnalysisResult::default(),
            cached_at,
            backend_model_id: "m".into(),
            prompt_count: 1,
            template_hash: TemplateHash::of("t"),
        }
    }

    #[test]
    fn expiry_is_inclusive_of_ttl() {
        let now = Utc::now();
        let ttl = Duration::from_secs(60);
        assert!(!entry_at(now - chrono::Duration::seconds(60)).is_expired(ttl, now));
        assert!(entry_at(now - chrono::Duration::seconds(61)).is_expired(ttl, now));
    }

    #[test]
    fn future_entries_are_fresh() {
        let now = Utc::now();
        let entry = entry_at(now + chrono::Duration::hours(1));
        assert!(!entry.is_expired(Duration::ZERO, now));
    }

    #[tokio::test]
    async fn write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.json");
        write_atomic(&path, b"{}").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["file.json".to_string()]);
    }
}

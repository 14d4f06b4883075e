//! Configuration loading.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. `--config <path>` (CLI flag; must exist)
//! 2. `~/.muninn/config.toml` (user)
//! 3. built-in defaults
//!
//! Secrets are loaded separately with mandatory permission checks from
//! `~/.muninn/secrets.toml` (must be 0600 or 0400), falling back to the
//! `ANTHROPIC_API_KEY` / `OPENAI_API_KEY` environment variables.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backends::RetryConfig;
use crate::batch::PackingPolicy;
use crate::cache::{CacheStore, DEFAULT_TTL};
use crate::{MuninnError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(default)]
    pub backends: BackendsConfig,
}

/// How a run selects its backend and shapes its batches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisSettings {
    /// Backends to try, in order. Empty = registration order
    /// (ollama, anthropic, openai).
    #[serde(default)]
    pub preferred_order: Vec<String>,
    /// Use exactly this backend; no fallback.
    #[serde(default)]
    pub force_backend: Option<String>,
    /// Per-batch token budget; overrides the backend's own budget.
    #[serde(default)]
    pub token_budget: Option<usize>,
    #[serde(default)]
    pub packing: PackingPolicy,
    /// Skip cache reads (fresh results are still written).
    #[serde(default)]
    pub bypass_cache: bool,
}

/// Result cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Cache directory (default: platform cache dir + `/muninn`).
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Entry lifetime in seconds (default: 7 days).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Disable the cache entirely.
    #[serde(default)]
    pub disabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_secs: default_ttl_secs(),
            disabled: false,
        }
    }
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Configured directory, or [`CacheStore::default_root`].
    pub fn root(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(CacheStore::default_root)
    }
}

/// Retry settings as written in TOML (millisecond fields).
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Attempts including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff in milliseconds (default: 500).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig::new()
            .max_attempts(settings.max_attempts)
            .initial_delay(Duration::from_millis(settings.initial_delay_ms))
            .max_delay(Duration::from_millis(settings.max_delay_ms))
    }
}

/// Availability probe settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    /// Per-probe bound in seconds (default: 5).
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_probe_timeout() -> u64 {
    5
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-backend configuration. A missing section means "use defaults".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub ollama: Option<BackendSettings>,
    #[serde(default)]
    pub anthropic: Option<BackendSettings>,
    #[serde(default)]
    pub openai: Option<BackendSettings>,
}

/// Settings shared by every backend. Unset fields keep the backend default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendSettings {
    /// Skip registering this backend.
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub token_budget: Option<usize>,
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl BackendSettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, `~/.muninn/config.toml`
    /// is used when present, otherwise the built-in defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MuninnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MuninnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MuninnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        Ok(dirs::home_dir()
            .map(|home| home.join(".muninn").join("config.toml"))
            .filter(|path| path.exists()))
    }
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub anthropic: Option<ApiKeySecret>,
    #[serde(default)]
    pub openai: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

impl std::fmt::Debug for ApiKeySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeySecret")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Backend name → environment variable name mapping.
const BACKEND_ENV_VARS: &[(&str, &str)] = &[
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
];

impl Secrets {
    /// Load `~/.muninn/secrets.toml` if present (must be 0600 or 0400).
    ///
    /// Returns empty secrets if no file exists (backends may use env vars).
    pub fn load() -> Result<Self> {
        match dirs::home_dir().map(|home| home.join(".muninn").join("secrets.toml")) {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Secrets::default()),
        }
    }

    /// Parse a secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            MuninnError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MuninnError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            MuninnError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(MuninnError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// API key for a backend, falling back to its environment variable.
    /// Blank values count as unset.
    pub fn api_key(&self, backend: &str) -> Option<String> {
        let from_file = match backend {
            "anthropic" => self.anthropic.as_ref(),
            "openai" => self.openai.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone())
        .filter(|k| !k.trim().is_empty());

        from_file.or_else(|| {
            BACKEND_ENV_VARS
                .iter()
                .find(|(name, _)| *name == backend)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
                .filter(|k| !k.trim().is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert!(config.analysis.preferred_order.is_empty());
        assert_eq!(config.analysis.packing, PackingPolicy::Chronological);
        assert!(!config.analysis.bypass_cache);
        assert_eq!(config.cache.ttl(), DEFAULT_TTL);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.probe.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [analysis]
            preferred_order = ["anthropic", "ollama"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.analysis.preferred_order, vec!["anthropic", "ollama"]);
        // Defaults preserved
        assert_eq!(config.retry.initial_delay_ms, 500);
        assert!(config.backends.ollama.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [analysis]
            force_backend = "ollama"
            token_budget = 2000
            packing = "priority"
            bypass_cache = true

            [cache]
            dir = "/tmp/muninn-cache"
            ttl_secs = 3600

            [retry]
            max_attempts = 5
            initial_delay_ms = 100
            max_delay_ms = 2000

            [probe]
            timeout_secs = 2

            [backends.ollama]
            base_url = "http://gpu-box:11434"
            model = "qwen2.5:14b"
            timeout_secs = 300

            [backends.anthropic]
            requests_per_minute = 20
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.analysis.force_backend.as_deref(), Some("ollama"));
        assert_eq!(config.analysis.token_budget, Some(2000));
        assert_eq!(config.analysis.packing, PackingPolicy::Priority);
        assert!(config.analysis.bypass_cache);
        assert_eq!(config.cache.root(), PathBuf::from("/tmp/muninn-cache"));
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.probe.timeout_secs, 2);

        let retry = RetryConfig::from(&config.retry);
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));
        assert_eq!(retry.max_delay, Duration::from_secs(2));

        let ollama = config.backends.ollama.unwrap();
        assert_eq!(ollama.model.as_deref(), Some("qwen2.5:14b"));
        assert_eq!(ollama.request_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(
            config.backends.anthropic.unwrap().requests_per_minute,
            Some(20)
        );
    }

    #[test]
    fn retry_settings_zero_attempts_clamped() {
        let settings = RetrySettings {
            max_attempts: 0,
            ..RetrySettings::default()
        };
        assert_eq!(RetryConfig::from(&settings).max_attempts, 1);
    }

    #[test]
    fn unknown_section_rejected() {
        let toml = r#"
            [server]
            address = "0.0.0.0:1"
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn parse_secrets() {
        let toml = r#"
            [anthropic]
            api_key = "sk-ant-test-key"
        "#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(
            secrets.anthropic.as_ref().unwrap().api_key,
            "sk-ant-test-key"
        );
        assert!(secrets.openai.is_none());
    }

    #[test]
    fn api_key_from_secrets() {
        let secrets = Secrets {
            anthropic: Some(ApiKeySecret {
                api_key: "from-file".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(secrets.api_key("anthropic"), Some("from-file".to_string()));
        // Unknown backend returns None
        assert_eq!(secrets.api_key("ollama"), None);
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = ApiKeySecret {
            api_key: "sk-very-secret".to_string(),
        };
        assert!(!format!("{secret:?}").contains("sk-very-secret"));
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[cfg(unix)]
    #[test]
    fn insecure_secrets_file_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "[openai]\napi_key = \"sk-x\"\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(
            Secrets::load_from_file(&path),
            Err(MuninnError::Configuration(_))
        ));

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        let secrets = Secrets::load_from_file(&path).unwrap();
        assert_eq!(secrets.api_key("openai"), Some("sk-x".to_string()));
    }
}

//! Configuration management for papertrail using the prefer crate.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotate::AnnotateOptions;
use crate::fetch::FetchPolicy;
use crate::llm::LlmConfig;
use crate::models::{Category, CategoryTaxonomy};

/// ar5iv mirror of arXiv HTML renderings.
pub const DEFAULT_SITE_BASE_URL: &str = "https://ar5iv.labs.arxiv.org";

/// Default user agent for page fetches.
pub const USER_AGENT: &str = "papertrail/0.1 (academic research)";

/// Cache subdirectory under the data directory.
const CACHE_SUBDIR: &str = "cache";

/// Runtime settings, resolved from defaults, the config file and CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Root of the JSON cache.
    pub cache_dir: PathBuf,
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay after each page fetch in milliseconds.
    pub request_delay_ms: u64,
    /// Retries after the first fetch attempt.
    pub max_retries: u32,
    /// Base wait after HTTP 429, in seconds.
    pub rate_limit_backoff_secs: u64,
    /// Base wait after a timeout or transport error, in seconds.
    pub retry_backoff_secs: u64,
    /// Papers processed at once, and comment calls in flight per paper.
    pub concurrency: usize,
    /// Longest paragraphs commented per paper.
    pub max_paragraphs: usize,
    /// Base URL pages are fetched from and figure paths resolve against.
    pub site_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        // ~/Documents/papertrail, falling back to the home then current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("papertrail");

        Self {
            cache_dir: data_dir.join(CACHE_SUBDIR),
            data_dir,
            user_agent: USER_AGENT.to_string(),
            request_timeout: 60,
            request_delay_ms: 1500,
            max_retries: 3,
            rate_limit_backoff_secs: 30,
            retry_backoff_secs: 10,
            concurrency: 3,
            max_paragraphs: 20,
            site_base_url: DEFAULT_SITE_BASE_URL.to_string(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            cache_dir: data_dir.join(CACHE_SUBDIR),
            data_dir,
            ..Default::default()
        }
    }

    /// Ensure the data and cache directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (dir, label) in [(&self.data_dir, "data"), (&self.cache_dir, "cache")] {
            fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                )
            })?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_retries: self.max_retries,
            rate_limit_backoff: Duration::from_secs(self.rate_limit_backoff_secs),
            retry_backoff: Duration::from_secs(self.retry_backoff_secs),
        }
    }

    pub fn annotate_options(&self) -> AnnotateOptions {
        AnnotateOptions {
            max_paragraphs: self.max_paragraphs,
            concurrency: self.concurrency,
            ..AnnotateOptions::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
}

/// Configuration file structure. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Cache directory path (defaults to `{data_dir}/cache`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Delay between requests in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_backoff_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_paragraphs: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_base_url: Option<String>,
    /// Ollama settings.
    #[serde(default, skip_serializing_if = "LlmConfig::is_default")]
    pub llm: LlmConfig,
    /// Replacement taxonomy; `other` is appended when missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover a papertrail config file in the standard locations.
    /// Falls back to defaults (with env overrides) when none is found or it
    /// fails to parse.
    pub async fn load() -> Self {
        match prefer::load("papertrail").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_else(|e| {
                    tracing::warn!("Ignoring config {}: {}", path.display(), e);
                    Self::default()
                }),
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file; the format follows the extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            })?,
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            })?,
            _ => serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            })?,
        };

        config.source_path = Some(path.to_path_buf());
        config.llm = config.llm.with_env_overrides();
        Ok(config)
    }

    /// Directory of the config file, if it came from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// `~` is expanded; relative paths are joined onto `base_dir`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.cache_dir = settings.data_dir.join(CACHE_SUBDIR);
        }
        if let Some(ref cache_dir) = self.cache_dir {
            settings.cache_dir = self.resolve_path(cache_dir, base_dir);
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(secs) = self.rate_limit_backoff_secs {
            settings.rate_limit_backoff_secs = secs;
        }
        if let Some(secs) = self.retry_backoff_secs {
            settings.retry_backoff_secs = secs;
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency.max(1);
        }
        if let Some(max) = self.max_paragraphs {
            settings.max_paragraphs = max;
        }
        if let Some(ref url) = self.site_base_url {
            settings.site_base_url = url.trim_end_matches('/').to_string();
        }
    }

    /// The configured taxonomy, or the built-in one.
    pub fn taxonomy(&self) -> CategoryTaxonomy {
        match &self.categories {
            Some(categories) if !categories.is_empty() => {
                CategoryTaxonomy::from_categories(categories.clone())
            }
            _ => CategoryTaxonomy::default(),
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of the config file directory.
    pub use_cwd: bool,
    /// Data directory (--data flag).
    pub data: Option<PathBuf>,
}

/// Look for `papertrail.{ext}` or `config.{ext}` inside the data directory.
fn find_config_in_data_dir(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["json", "yaml", "yml", "toml"];
    let basenames = ["papertrail", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

async fn load_file_config(options: &LoadOptions, data_dir_override: Option<&PathBuf>) -> Config {
    // Priority 1: Explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return Config::load_from_path(config_path)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Ignoring config {}: {}", config_path.display(), e);
                Config::default()
            });
    }

    // Priority 2: Config inside the data dir
    if let Some(data_dir) = data_dir_override {
        if let Some(config_path) = find_config_in_data_dir(data_dir) {
            tracing::debug!("Found config in data dir: {}", config_path.display());
            return Config::load_from_path(&config_path)
                .await
                .unwrap_or_else(|_| Config::default());
        }
    }

    // Priority 3: Auto-discover via prefer
    Config::load().await
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let data_dir_override = options.data.as_deref().map(absolute);

    let config = load_file_config(&options, data_dir_override.as_ref()).await;

    let mut settings = Settings::default();

    let base_dir = if options.use_cwd {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        config
            .base_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    };

    config.apply_to_settings(&mut settings, &base_dir);

    // --data takes precedence over the config file
    if let Some(data_dir) = data_dir_override {
        let explicit_cache = config.cache_dir.is_some();
        settings.data_dir = data_dir;
        if !explicit_cache {
            settings.cache_dir = settings.data_dir.join(CACHE_SUBDIR);
        }
    }

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::with_data_dir(PathBuf::from("/tmp/pt"));
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/pt/cache"));
        assert_eq!(settings.request_delay(), Duration::from_millis(1500));
        assert_eq!(settings.fetch_policy(), FetchPolicy::default());
        assert_eq!(settings.annotate_options(), AnnotateOptions::default());
    }

    #[tokio::test]
    async fn test_load_toml_and_apply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("papertrail.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "data"
concurrency = 0
max_paragraphs = 5
site_base_url = "http://mirror.local/"

[llm]
model_large = "llama3:8b"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());
        assert_eq!(settings.data_dir, dir.path().join("data"));
        assert_eq!(settings.cache_dir, dir.path().join("data").join("cache"));
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.max_paragraphs, 5);
        assert_eq!(settings.site_base_url, "http://mirror.local");
        assert_eq!(config.llm.model_large, "llama3:8b");
    }

    #[tokio::test]
    async fn test_load_yaml_and_json() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("c.yaml");
        std::fs::write(&yaml, "request_delay_ms: 10\nmax_retries: 1\n").unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.request_delay_ms, Some(10));
        assert_eq!(config.max_retries, Some(1));

        let json = dir.path().join("c.json");
        std::fs::write(&json, r#"{"user_agent": "ua"}"#).unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(config.user_agent.as_deref(), Some("ua"));

        std::fs::write(&json, "{ nope").unwrap();
        assert!(matches!(
            Config::load_from_path(&json).await,
            Err(ConfigError::Parse { format: "JSON", .. })
        ));
    }

    #[test]
    fn test_resolve_path() {
        let config = Config::default();
        let base = Path::new("/base");
        assert_eq!(config.resolve_path("/abs", base), PathBuf::from("/abs"));
        assert_eq!(config.resolve_path("rel", base), PathBuf::from("/base/rel"));
        assert!(!config.resolve_path("~/x", base).starts_with("~"));
    }

    #[test]
    fn test_custom_taxonomy_keeps_fallback() {
        let config = Config {
            categories: Some(vec![Category {
                id: "bio".into(),
                name: "Biology".into(),
                name_zh: "生物".into(),
                keywords: vec![],
            }]),
            ..Config::default()
        };
        let taxonomy = config.taxonomy();
        assert_eq!(taxonomy.len(), 2);
        assert_eq!(taxonomy.resolve("banana").id, "other");
    }

    #[tokio::test]
    async fn test_data_flag_overrides_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("papertrail.json");
        std::fs::write(&config_path, r#"{"max_paragraphs": 7}"#).unwrap();

        let (settings, _) = load_settings_with_options(LoadOptions {
            config_path: None,
            use_cwd: false,
            data: Some(dir.path().to_path_buf()),
        })
        .await;
        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.cache_dir, dir.path().join("cache"));
        assert_eq!(settings.max_paragraphs, 7);
    }
}

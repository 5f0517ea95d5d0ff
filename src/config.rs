//! Configuration file parser for ~/.config/category-tree/config.toml.
//!
//! The file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged, since they are usually typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::tree::ClearSearch;

/// Env var that overrides `api_token` from the file.
pub const TOKEN_ENV_VAR: &str = "CATEGORY_TREE_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },
}

// ============================================================================
// Configuration
// ============================================================================

/// Application configuration. Any subset of keys may be given.
///
/// `Debug` masks `api_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the category API, e.g. `https://shop.example.com/api`.
    pub api_base_url: String,

    /// Bearer token for the API. `CATEGORY_TREE_TOKEN` takes precedence.
    pub api_token: Option<String>,

    /// Per-request timeout.
    pub request_timeout_secs: u64,

    /// Retries for failed child-list reads (0 disables retrying).
    pub max_retries: u32,

    /// Initial backoff between retries, doubled each attempt.
    pub retry_backoff_ms: u64,

    /// Concurrent requests while building the search index.
    pub search_concurrency: usize,

    /// Expansion policy when the search box is cleared.
    pub clear_search: ClearSearch,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            api_token: None,
            request_timeout_secs: 15,
            max_retries: 2,
            retry_backoff_ms: 500,
            search_concurrency: 4,
            clear_search: ClearSearch::default(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("search_concurrency", &self.search_concurrency)
            .field("clear_search", &self.clear_search)
            .finish()
    }
}

impl Config {
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "api_base_url",
        "api_token",
        "request_timeout_secs",
        "max_retries",
        "retry_backoff_ms",
        "search_concurrency",
        "clear_search",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing or blank file → defaults
    /// - Invalid TOML or wrong value types → `ConfigError::Parse`
    /// - Files over 1 MB → `ConfigError::TooLarge`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge {
                    size: meta.len(),
                    max: Self::MAX_FILE_SIZE,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            api_base_url = %config.api_base_url,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Let the environment override the file's token. Blank values are ignored.
    pub fn apply_env_token(&mut self, env_value: Option<String>) {
        if let Some(token) = env_value.filter(|t| !t.trim().is_empty()) {
            tracing::debug!("Using API token from {}", TOKEN_ENV_VAR);
            self.api_token = Some(token);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("category_tree_config_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:8080/api");
        assert!(config.api_token.is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_backoff(), Duration::from_millis(500));
        assert_eq!(config.search_concurrency, 4);
        assert_eq!(config.clear_search, ClearSearch::Collapse);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/category_tree_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_blank_file_returns_default() {
        let (dir, path) = write_config("blank", "  \n\n ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.search_concurrency, 4);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let (dir, path) = write_config(
            "full",
            r#"
api_base_url = "https://shop.example.com/api"
api_token = "file-token"
request_timeout_secs = 5
max_retries = 0
retry_backoff_ms = 100
search_concurrency = 8
clear_search = "restore"
"#,
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_base_url, "https://shop.example.com/api");
        assert_eq!(config.api_token.as_deref(), Some("file-token"));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.retry_backoff_ms, 100);
        assert_eq!(config.search_concurrency, 8);
        assert_eq!(config.clear_search, ClearSearch::Restore);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let (dir, path) = write_config("partial", "max_retries = 5\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.request_timeout_secs, 15);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_clear_search_policy_rejected() {
        let (dir, path) = write_config("bad_policy", "clear_search = \"explode\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (dir, path) = write_config("unknown", "max_retries = 1\nthem = \"dark\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_retries, 1);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"#".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge { .. }));
        assert!(err.to_string().contains("too large"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_timeout_floor_is_one_second() {
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_env_token_overrides_file() {
        let mut config = Config {
            api_token: Some("from-file".into()),
            ..Config::default()
        };
        config.apply_env_token(Some("   ".into()));
        assert_eq!(config.api_token.as_deref(), Some("from-file"));
        config.apply_env_token(None);
        assert_eq!(config.api_token.as_deref(), Some("from-file"));
        config.apply_env_token(Some("from-env".into()));
        assert_eq!(config.api_token.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_debug_masks_api_token() {
        let config = Config {
            api_token: Some("super-secret-token-12345".into()),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-token-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_debug_shows_none_without_token() {
        let debug_output = format!("{:?}", Config::default());
        assert!(!debug_output.contains("[REDACTED]"));
    }
}

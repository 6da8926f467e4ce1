//! Configuration file parser for ~/.config/feed-masher/config.toml.
//!
//! The config file is optional. A missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, though we log a warning when the
//! file contains potential typos.
use crate::feed::{AggregateOptions, MergeOptions, MergedFeedSpec, DEFAULT_BASE_URL};
use crate::resolver::DEFAULT_GITHUB_API_BASE;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// SEC-015: Custom Debug impl masks `github_token`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Public base URL the merged feeds are served under.
    pub base_url: String,

    /// Address the HTTP server binds to.
    pub listen: String,

    /// Per-source fetch timeout in seconds. 0 = no timeout.
    pub fetch_timeout_secs: u64,

    /// Entries taken from each source feed.
    pub max_entries_per_source: usize,

    /// Maximum simultaneous source fetches. 0 = unbounded.
    pub max_concurrent_fetches: usize,

    /// `Cache-Control: max-age` advertised on served feeds.
    pub cache_max_age_secs: u64,

    /// GitHub API base used to resolve Gists.
    pub github_api_base: String,

    /// GitHub token (alternative to GITHUB_TOKEN env var).
    /// Env var takes precedence over config file.
    pub github_token: Option<String>,

    /// Feed served at `/feed.xml` and generated by default.
    pub feed: Option<FeedConfig>,
}

/// A statically configured merged feed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl From<FeedConfig> for MergedFeedSpec {
    fn from(feed: FeedConfig) -> Self {
        MergedFeedSpec {
            id: feed.id,
            title: feed.title,
            author: feed.author,
            sources: feed.sources,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            listen: "127.0.0.1:8000".to_string(),
            fetch_timeout_secs: 30,
            max_entries_per_source: crate::feed::parser::DEFAULT_MAX_ENTRIES,
            max_concurrent_fetches: 0,
            cache_max_age_secs: 3600,
            github_api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            github_token: None,
            feed: None,
        }
    }
}

/// SEC-015: Mask github_token in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("listen", &self.listen)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("max_entries_per_source", &self.max_entries_per_source)
            .field("max_concurrent_fetches", &self.max_concurrent_fetches)
            .field("cache_max_age_secs", &self.cache_max_age_secs)
            .field("github_api_base", &self.github_api_base)
            .field(
                "github_token",
                &self.github_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("feed", &self.feed)
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "base_url",
        "listen",
        "fetch_timeout_secs",
        "max_entries_per_source",
        "max_concurrent_fetches",
        "cache_max_age_secs",
        "github_api_base",
        "github_token",
        "feed",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted, logged as warning
    /// - Invalid values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), base_url = %config.base_url, "Loaded configuration");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries_per_source == 0 {
            return Err(ConfigError::Invalid(
                "max_entries_per_source must be at least 1".to_string(),
            ));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("base_url: {}", e)))?;
        if let Some(feed) = &self.feed {
            if feed.id.trim().is_empty() {
                return Err(ConfigError::Invalid("feed.id must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// GitHub token, preferring the GITHUB_TOKEN env var over the file.
    pub fn resolve_github_token(&self) -> Option<secrecy::SecretString> {
        std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.github_token.clone())
            .map(secrecy::SecretString::from)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_secs > 0).then(|| Duration::from_secs(self.fetch_timeout_secs))
    }

    /// Pipeline options derived from this configuration.
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            base_url: self.base_url.clone(),
            aggregate: AggregateOptions {
                max_entries_per_source: self.max_entries_per_source,
                max_concurrency: NonZeroUsize::new(self.max_concurrent_fetches),
                fetch_timeout: self.fetch_timeout(),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.base_url, "https://feed-masher.deno.dev");
        assert_eq!(config.listen, "127.0.0.1:8000");
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.max_entries_per_source, 10);
        assert_eq!(config.max_concurrent_fetches, 0);
        assert_eq!(config.cache_max_age_secs, 3600);
        assert_eq!(config.github_api_base, "https://api.github.com");
        assert!(config.github_token.is_none());
        assert!(config.feed.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feed_masher_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.listen, "127.0.0.1:8000");
    }

    #[test]
    fn test_empty_and_whitespace_return_default() {
        assert_eq!(Config::from_toml("").unwrap().max_entries_per_source, 10);
        assert_eq!(
            Config::from_toml("   \n  \n  ").unwrap().max_entries_per_source,
            10
        );
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("feed_masher_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
base_url = "https://feeds.example.com"
listen = "0.0.0.0:9000"
fetch_timeout_secs = 5
max_entries_per_source = 3
max_concurrent_fetches = 4
cache_max_age_secs = 60
github_api_base = "https://ghe.example.com/api/v3"
github_token = "token-123"

[feed]
id = "tech"
title = "Tech feeds"
author = "Caleb Cox"
sources = ["https://a.example/feed", "https://b.example/rss"]
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.base_url, "https://feeds.example.com");
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(config.fetch_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.github_token.as_deref(), Some("token-123"));
        assert_eq!(
            config.feed,
            Some(FeedConfig {
                id: "tech".to_string(),
                title: "Tech feeds".to_string(),
                author: "Caleb Cox".to_string(),
                sources: vec![
                    "https://a.example/feed".to_string(),
                    "https://b.example/rss".to_string()
                ],
            })
        );

        let options = config.merge_options();
        assert_eq!(options.base_url, "https://feeds.example.com");
        assert_eq!(options.aggregate.max_entries_per_source, 3);
        assert_eq!(options.aggregate.max_concurrency, NonZeroUsize::new(4));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_zero_means_unbounded_and_no_timeout() {
        let config =
            Config::from_toml("max_concurrent_fetches = 0\nfetch_timeout_secs = 0\n").unwrap();
        let options = config.merge_options();
        assert_eq!(options.aggregate.max_concurrency, None);
        assert_eq!(options.aggregate.fetch_timeout, None);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::from_toml("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::from_toml("listen = \"[::]:80\"\ntotally_fake_key = 1\n").unwrap();
        assert_eq!(config.listen, "[::]:80");
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::from_toml("max_entries_per_source = \"ten\"\n").is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::from_toml("max_entries_per_source = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("base_url = \"not a url\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[feed]\nid = \" \"\ntitle = \"t\"\nauthor = \"a\"\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_feed_without_sources_defaults_empty() {
        let config = Config::from_toml("[feed]\nid = \"x\"\ntitle = \"t\"\nauthor = \"a\"\n").unwrap();
        let spec: MergedFeedSpec = config.feed.unwrap().into();
        assert!(spec.sources.is_empty());
        assert_eq!(spec.id, "x");
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("feed_masher_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    // SEC-015: Debug output masks the token
    #[test]
    fn test_debug_masks_github_token() {
        let config = Config {
            github_token: Some("ghp_supersecret".to_string()),
            ..Config::default()
        };

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("ghp_supersecret"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}

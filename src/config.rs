//! Configuration file parser for ~/.config/feedarr/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown sections are silently ignored by serde, though we log a warning
//! when the file contains potential typos. Environment variables take
//! precedence over file values (see [`Config::apply_env`]).
use crate::ingest::IngestSettings;
use crate::model::{QueueMarkers, GIB};
use crate::reconcile::{ReconcileSettings, SizeBounds, TitleParser, DEFAULT_RELEASE_MARKER};
use crate::scrape::{RetryPolicy, DEFAULT_ATTACHMENT_PATTERN};
use crate::services::qbittorrent::QbitSettings;
use crate::services::radarr::RadarrSettings;
use crate::util::validate_endpoint_url;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
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

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A required setting is empty.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A URL setting is not a usable http(s) URL.
    #[error("Invalid URL for {key}: {reason}")]
    InvalidUrl { key: &'static str, reason: String },

    /// A setting has a value outside its allowed range.
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub scrape: ScrapeConfig,
    pub ingest: IngestConfig,
    pub qbittorrent: QbittorrentConfig,
    pub radarr: RadarrConfig,
    pub ntfy: NtfyConfig,
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// RSS feed to watch.
    pub url: String,
    /// Poll interval in minutes.
    pub check_interval_minutes: u64,
    /// Where the last fetched feed document is kept. Empty disables it.
    pub snapshot_path: PathBuf,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            check_interval_minutes: 300,
            snapshot_path: PathBuf::from("feed.xml"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub max_retries: u32,
    pub delay_ms: u64,
    /// Substring identifying attachment links on a release page.
    pub attachment_pattern: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay_ms: 1000,
            attachment_pattern: DEFAULT_ATTACHMENT_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub scratch_dir: PathBuf,
    pub batch_threshold: usize,
    pub chunk_size: usize,
    pub chunk_pause_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let defaults = IngestSettings::default();
        Self {
            scratch_dir: defaults.scratch_dir,
            batch_threshold: defaults.batch_threshold,
            chunk_size: defaults.chunk_size,
            chunk_pause_ms: defaults.chunk_pause.as_millis() as u64,
        }
    }
}

/// Masks `password` in Debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct QbittorrentConfig {
    pub url: String,
    pub username: String,
    pub password: Option<String>,
    pub category: String,
    pub tag: String,
}

impl Default for QbittorrentConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: None,
            category: "radarr".to_string(),
            tag: "tamilmv".to_string(),
        }
    }
}

impl std::fmt::Debug for QbittorrentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QbittorrentConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("category", &self.category)
            .field("tag", &self.tag)
            .finish()
    }
}

/// Masks `api_key` in Debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct RadarrConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub quality_profile_id: u32,
    pub root_folder: String,
}

impl Default for RadarrConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            quality_profile_id: 1,
            root_folder: String::new(),
        }
    }
}

impl std::fmt::Debug for RadarrConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadarrConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("quality_profile_id", &self.quality_profile_id)
            .field("root_folder", &self.root_folder)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NtfyConfig {
    pub enabled: bool,
    pub server: String,
    pub topic: String,
}

impl Default for NtfyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server: "https://ntfy.sh".to_string(),
            topic: "tamilmv-movies".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Smallest accepted download, in GiB (inclusive).
    pub min_size_gib: u64,
    /// Largest accepted download, in GiB (inclusive).
    pub max_size_gib: u64,
    /// Regex for the site marker that prefixes release names.
    pub release_marker: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            min_size_gib: 1,
            max_size_gib: 3,
            release_marker: DEFAULT_RELEASE_MARKER.to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_SECTIONS: [&'static str; 7] = [
        "feed",
        "scrape",
        "ingest",
        "qbittorrent",
        "radarr",
        "ntfy",
        "reconcile",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown sections → silently accepted, logged as warning
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

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_SECTIONS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown section in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Override file values with environment variables.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = value;
            }
        };
        set(&mut self.feed.url, "FEED_URL");
        set(&mut self.qbittorrent.url, "QBITTORRENT_URL");
        set(&mut self.qbittorrent.username, "QBITTORRENT_USERNAME");
        set(&mut self.radarr.url, "RADARR_URL");
        set(&mut self.radarr.root_folder, "RADARR_ROOT_FOLDER");
        set(&mut self.ntfy.topic, "NTFY_TOPIC");

        if let Some(password) = lookup("QBITTORRENT_PASSWORD").filter(|v| !v.is_empty()) {
            self.qbittorrent.password = Some(password);
        }
        if let Some(key) = lookup("RADARR_API_KEY").filter(|v| !v.is_empty()) {
            self.radarr.api_key = Some(key);
        }
    }

    /// Check that everything needed to run is present and well-formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("feed.url", &self.feed.url)?;
        check_url("qbittorrent.url", &self.qbittorrent.url)?;
        check_url("radarr.url", &self.radarr.url)?;
        if self.ntfy.enabled {
            check_url("ntfy.server", &self.ntfy.server)?;
        }

        if self.qbittorrent.username.is_empty() {
            return Err(ConfigError::Missing("qbittorrent.username"));
        }
        if self.qbittorrent.password.is_none() {
            return Err(ConfigError::Missing("qbittorrent.password"));
        }
        if self.radarr.api_key.is_none() {
            return Err(ConfigError::Missing("radarr.api_key"));
        }
        if self.radarr.root_folder.is_empty() {
            return Err(ConfigError::Missing("radarr.root_folder"));
        }
        if self.feed.check_interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "feed.check_interval_minutes",
                reason: "must be at least 1".into(),
            });
        }
        if self.ingest.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ingest.chunk_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.reconcile.min_size_gib > self.reconcile.max_size_gib {
            return Err(ConfigError::InvalidValue {
                key: "reconcile.min_size_gib",
                reason: "must not exceed reconcile.max_size_gib".into(),
            });
        }
        self.title_parser()?;
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.feed.check_interval_minutes.saturating_mul(60))
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        if self.feed.snapshot_path.as_os_str().is_empty() {
            None
        } else {
            Some(self.feed.snapshot_path.clone())
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.scrape.max_retries,
            delay: Duration::from_millis(self.scrape.delay_ms),
        }
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            scratch_dir: self.ingest.scratch_dir.clone(),
            batch_threshold: self.ingest.batch_threshold,
            chunk_size: self.ingest.chunk_size,
            chunk_pause: Duration::from_millis(self.ingest.chunk_pause_ms),
        }
    }

    pub fn markers(&self) -> QueueMarkers {
        QueueMarkers {
            tag: self.qbittorrent.tag.clone(),
            category: self.qbittorrent.category.clone(),
        }
    }

    pub fn size_bounds(&self) -> SizeBounds {
        SizeBounds {
            min_bytes: self.reconcile.min_size_gib.saturating_mul(GIB),
            max_bytes: self.reconcile.max_size_gib.saturating_mul(GIB),
        }
    }

    pub fn title_parser(&self) -> Result<TitleParser, ConfigError> {
        TitleParser::new(&self.reconcile.release_marker).map_err(|e| ConfigError::InvalidValue {
            key: "reconcile.release_marker",
            reason: e.to_string(),
        })
    }

    pub fn reconcile_settings(&self) -> Result<ReconcileSettings, ConfigError> {
        Ok(ReconcileSettings {
            markers: self.markers(),
            bounds: self.size_bounds(),
            titles: self.title_parser()?,
        })
    }

    /// Call after [`Config::validate`]; a missing password becomes empty.
    pub fn qbit_settings(&self) -> QbitSettings {
        QbitSettings {
            base_url: self.qbittorrent.url.trim_end_matches('/').to_string(),
            username: self.qbittorrent.username.clone(),
            password: SecretString::from(self.qbittorrent.password.clone().unwrap_or_default()),
            markers: self.markers(),
        }
    }

    /// Call after [`Config::validate`]; a missing API key becomes empty.
    pub fn radarr_settings(&self) -> RadarrSettings {
        RadarrSettings {
            base_url: self.radarr.url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(self.radarr.api_key.clone().unwrap_or_default()),
            quality_profile_id: self.radarr.quality_profile_id,
            root_folder: self.radarr.root_folder.clone(),
        }
    }
}

fn check_url(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(key));
    }
    validate_endpoint_url(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidUrl {
            key,
            reason: e.to_string(),
        })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete() -> Config {
        let mut config = Config::default();
        config.feed.url = "https://example.com/rss".into();
        config.qbittorrent.url = "http://localhost:8080".into();
        config.qbittorrent.username = "admin".into();
        config.qbittorrent.password = Some("pw".into());
        config.radarr.url = "http://localhost:7878".into();
        config.radarr.api_key = Some("key".into());
        config.radarr.root_folder = "/movies".into();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feed.check_interval_minutes, 300);
        assert_eq!(config.scrape.max_retries, 5);
        assert_eq!(config.scrape.delay_ms, 1000);
        assert_eq!(config.ingest.batch_threshold, 200);
        assert_eq!(config.ingest.chunk_size, 50);
        assert_eq!(config.qbittorrent.category, "radarr");
        assert_eq!(config.qbittorrent.tag, "tamilmv");
        assert_eq!(config.radarr.quality_profile_id, 1);
        assert!(config.ntfy.enabled);
        assert_eq!(config.size_bounds(), SizeBounds::default());
        assert_eq!(config.check_interval(), Duration::from_secs(18_000));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.feed.check_interval_minutes, 300);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "   \n  \n  ").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.scrape.max_retries, 5);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[feed]\nurl = \"https://example.com/rss\"\n\n[scrape]\nmax_retries = 2\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.feed.url, "https://example.com/rss");
        assert_eq!(config.feed.check_interval_minutes, 300);
        assert_eq!(config.scrape.max_retries, 2);
        assert_eq!(config.scrape.delay_ms, 1000);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_sections_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sonarr]\nurl = \"x\"\n\n[ntfy]\nenabled = false\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.ntfy.enabled);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::default();
        config.feed.url = "https://file.example.com/rss".into();

        let env: HashMap<&str, &str> = [
            ("FEED_URL", "https://env.example.com/rss"),
            ("QBITTORRENT_PASSWORD", "from-env"),
            ("RADARR_API_KEY", "env-key"),
            ("NTFY_TOPIC", ""),
        ]
        .into_iter()
        .collect();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.feed.url, "https://env.example.com/rss");
        assert_eq!(config.qbittorrent.password.as_deref(), Some("from-env"));
        assert_eq!(config.radarr.api_key.as_deref(), Some("env-key"));
        // Empty values do not override
        assert_eq!(config.ntfy.topic, "tamilmv-movies");
    }

    #[test]
    fn test_validate_complete_config() {
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing_and_bad_urls() {
        let mut config = complete();
        config.feed.url.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("feed.url"))
        ));

        let mut config = complete();
        config.radarr.url = "ftp://radarr".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { key: "radarr.url", .. })
        ));

        let mut config = complete();
        config.qbittorrent.password = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("qbittorrent.password"))
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_size_bounds() {
        let mut config = complete();
        config.reconcile.min_size_gib = 4;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_release_marker() {
        let mut config = complete();
        config.reconcile.release_marker = "www.(".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                key: "reconcile.release_marker",
                ..
            })
        ));
    }

    #[test]
    fn test_custom_release_marker_reaches_reconcile_settings() {
        let mut config = complete();
        config.reconcile.release_marker = r"\[Example\]".into();
        let settings = config.reconcile_settings().unwrap();
        assert_eq!(
            settings.titles.movie_name("[Example] - Foo (2020) WEB"),
            "Foo (2020)"
        );
    }

    #[test]
    fn test_debug_masks_secrets() {
        let debug_output = format!("{:?}", complete());
        assert!(!debug_output.contains("pw\""));
        assert!(!debug_output.contains("\"key\""));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_service_settings_trim_trailing_slash() {
        let mut config = complete();
        config.qbittorrent.url = "http://localhost:8080/".into();
        config.radarr.url = "http://localhost:7878/".into();

        assert_eq!(config.qbit_settings().base_url, "http://localhost:8080");
        assert_eq!(config.qbit_settings().markers.tag, "tamilmv");
        assert_eq!(config.radarr_settings().base_url, "http://localhost:7878");
        assert_eq!(config.radarr_settings().root_folder, "/movies");
    }

    #[test]
    fn test_empty_snapshot_path_disables_snapshot() {
        let mut config = Config::default();
        assert_eq!(config.snapshot_path(), Some(PathBuf::from("feed.xml")));
        config.feed.snapshot_path = PathBuf::new();
        assert_eq!(config.snapshot_path(), None);
    }
}

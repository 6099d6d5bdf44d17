use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::SourceType;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queues: QueuesConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub rss: RssConfig,
    #[serde(default)]
    pub instagram: BridgeConfig,
    #[serde(default)]
    pub twitter: BridgeConfig,
}

#[derive(Debug, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: String,
    #[serde(default = "default_stalled_after")]
    pub stalled_after: String,
    /// Status server address, e.g. `127.0.0.1:8080`. Disabled when unset.
    #[serde(default)]
    pub listen: Option<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            worker_concurrency: default_worker_concurrency(),
            poll_interval: default_poll_interval(),
            shutdown_timeout: default_shutdown_timeout(),
            stalled_after: default_stalled_after(),
            listen: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_worker_concurrency() -> usize {
    1
}
fn default_poll_interval() -> String {
    "1s".to_string()
}
fn default_shutdown_timeout() -> String {
    "10s".to_string()
}
fn default_stalled_after() -> String {
    "5m".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "collector.db".to_string()
}

#[derive(Debug, Deserialize)]
pub struct QueuesConfig {
    #[serde(default = "default_instagram_queue")]
    pub instagram_fetcher: String,
    #[serde(default = "default_twitter_queue")]
    pub twitter_fetcher: String,
    #[serde(default = "default_rss_queue")]
    pub rss_fetcher: String,
    #[serde(default = "default_results_queue")]
    pub fetch_results: String,
    #[serde(default = "default_media_queue")]
    pub media_upload: String,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            instagram_fetcher: default_instagram_queue(),
            twitter_fetcher: default_twitter_queue(),
            rss_fetcher: default_rss_queue(),
            fetch_results: default_results_queue(),
            media_upload: default_media_queue(),
        }
    }
}

fn default_instagram_queue() -> String {
    "sources.instagram-fetcher".to_string()
}
fn default_twitter_queue() -> String {
    "sources.twitter-fetcher".to_string()
}
fn default_rss_queue() -> String {
    "sources.rss-fetcher".to_string()
}
fn default_results_queue() -> String {
    "sources.fetch-results".to_string()
}
fn default_media_queue() -> String {
    "media.upload".to_string()
}

impl QueuesConfig {
    /// Inbound queue consumed by the worker of `source_type`.
    pub fn fetcher(&self, source_type: SourceType) -> &str {
        match source_type {
            SourceType::Instagram => &self.instagram_fetcher,
            SourceType::Twitter => &self.twitter_fetcher,
            SourceType::Rss => &self.rss_fetcher,
        }
    }

    fn all(&self) -> [&str; 5] {
        [
            &self.instagram_fetcher,
            &self.twitter_fetcher,
            &self.rss_fetcher,
            &self.fetch_results,
            &self.media_upload,
        ]
    }
}

/// Delivery options applied to every job this process publishes.
#[derive(Debug, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff")]
    pub backoff: String,
    #[serde(default = "default_remove_on_complete")]
    pub remove_on_complete: u32,
    #[serde(default = "default_remove_on_fail")]
    pub remove_on_fail: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff: default_backoff(),
            remove_on_complete: default_remove_on_complete(),
            remove_on_fail: default_remove_on_fail(),
        }
    }
}

fn default_attempts() -> u32 {
    5
}
fn default_backoff() -> String {
    "2s".to_string()
}
fn default_remove_on_complete() -> u32 {
    100
}
fn default_remove_on_fail() -> u32 {
    1000
}

#[derive(Debug, Deserialize)]
pub struct RssConfig {
    #[serde(default = "default_rss_enabled")]
    pub enabled: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_items")]
    pub max_entries: u32,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            enabled: default_rss_enabled(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            max_entries: default_max_items(),
            concurrency: None,
        }
    }
}

fn default_rss_enabled() -> bool {
    true
}
fn default_request_timeout() -> String {
    "30s".to_string()
}
fn default_user_agent() -> String {
    concat!("social-collector/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_max_items() -> u32 {
    50
}

/// Settings for an Instagram or Twitter JSON bridge.
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bridge_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay: String,
    #[serde(default = "default_max_items", alias = "max_posts", alias = "max_tweets")]
    pub max_items: u32,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bridge_url: None,
            request_timeout: default_request_timeout(),
            rate_limit_delay: default_rate_limit_delay(),
            max_items: default_max_items(),
            concurrency: None,
        }
    }
}

fn default_rate_limit_delay() -> String {
    "1s".to_string()
}

/// Parse a humantime duration, naming the setting on failure.
pub fn parse_duration(setting: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value)
        .map_err(|e| ConfigError::Validation(format!("{setting} '{value}': {e}")))
}

impl Config {
    /// Resolve the database path (relative to data_dir if not absolute).
    pub fn db_path(&self) -> PathBuf {
        let db_path = Path::new(&self.database.path);
        if db_path.is_absolute() {
            db_path.to_path_buf()
        } else {
            self.collector.data_dir.join(db_path)
        }
    }

    pub fn is_enabled(&self, source_type: SourceType) -> bool {
        match source_type {
            SourceType::Instagram => self.instagram.enabled,
            SourceType::Twitter => self.twitter.enabled,
            SourceType::Rss => self.rss.enabled,
        }
    }

    /// Number of jobs a worker of `source_type` runs at once.
    pub fn concurrency(&self, source_type: SourceType) -> usize {
        let specific = match source_type {
            SourceType::Instagram => self.instagram.concurrency,
            SourceType::Twitter => self.twitter.concurrency,
            SourceType::Rss => self.rss.concurrency,
        };
        specific.unwrap_or(self.collector.worker_concurrency)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(ConfigError::ReadFile)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: Config = toml::from_str(&content).map_err(ConfigError::Parse)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<()> {
    let collector = &config.collector;
    parse_duration("collector.poll_interval", &collector.poll_interval)?;
    parse_duration("collector.shutdown_timeout", &collector.shutdown_timeout)?;
    parse_duration("collector.stalled_after", &collector.stalled_after)?;
    parse_duration("delivery.backoff", &config.delivery.backoff)?;
    parse_duration("rss.request_timeout", &config.rss.request_timeout)?;

    if collector.worker_concurrency == 0 {
        return Err(ConfigError::Validation("collector.worker_concurrency must be at least 1".to_string()).into());
    }

    if config.delivery.attempts == 0 {
        return Err(ConfigError::Validation("delivery.attempts must be at least 1".to_string()).into());
    }

    if let Some(listen) = &collector.listen {
        listen
            .parse::<std::net::SocketAddr>()
            .map_err(|e| ConfigError::Validation(format!("collector.listen '{listen}': {e}")))?;
    }

    let mut queue_names = HashSet::new();
    for name in config.queues.all() {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation("queue names must not be empty".to_string()).into());
        }
        if !queue_names.insert(name) {
            return Err(ConfigError::Validation(format!("duplicate queue name: '{name}'")).into());
        }
    }

    for (section, bridge) in [("instagram", &config.instagram), ("twitter", &config.twitter)] {
        parse_duration(&format!("{section}.request_timeout"), &bridge.request_timeout)?;
        parse_duration(&format!("{section}.rate_limit_delay"), &bridge.rate_limit_delay)?;

        if bridge.enabled {
            match bridge.bridge_url.as_deref() {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) => {
                    return Err(ConfigError::Validation(format!(
                        "{section}: bridge_url '{url}' must be an http(s) URL"
                    ))
                    .into());
                }
                None => {
                    return Err(
                        ConfigError::Validation(format!("{section}: enabled source must have a 'bridge_url'")).into(),
                    );
                }
            }
        }
    }

    for source_type in SourceType::ALL {
        if config.concurrency(source_type) == 0 {
            return Err(ConfigError::Validation(format!("{source_type}: concurrency must be at least 1")).into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("");
        assert_eq!(config.collector.log_level, "info");
        assert_eq!(config.queues.rss_fetcher, "sources.rss-fetcher");
        assert_eq!(config.queues.fetch_results, "sources.fetch-results");
        assert_eq!(config.queues.media_upload, "media.upload");
        assert_eq!(config.delivery.attempts, 5);
        assert_eq!(config.delivery.remove_on_complete, 100);
        assert_eq!(config.delivery.remove_on_fail, 1000);
        assert!(config.rss.enabled);
        assert!(!config.instagram.enabled);
        assert_eq!(config.rss.max_entries, 50);
        assert_eq!(config.db_path(), PathBuf::from("./data/collector.db"));
        validate_config(&config).unwrap();
    }

    #[test]
    fn bridge_limits_accept_source_specific_names() {
        let config = parse(
            r#"
            [instagram]
            enabled = true
            bridge_url = "http://127.0.0.1:9000"
            max_posts = 12

            [twitter]
            max_tweets = 30
            concurrency = 3
            "#,
        );
        assert_eq!(config.instagram.max_items, 12);
        assert_eq!(config.twitter.max_items, 30);
        assert_eq!(config.concurrency(SourceType::Twitter), 3);
        assert_eq!(config.concurrency(SourceType::Rss), 1);
        validate_config(&config).unwrap();
    }

    #[test]
    fn enabled_bridge_requires_url() {
        let config = parse("[twitter]\nenabled = true\n");
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("bridge_url"));

        let config = parse("[twitter]\nenabled = true\nbridge_url = \"ftp://x\"\n");
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_bad_durations() {
        let config = parse("[collector]\npoll_interval = \"soon\"\n");
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("collector.poll_interval"));
    }

    #[test]
    fn rejects_duplicate_queue_names() {
        let config = parse("[queues]\nrss_fetcher = \"media.upload\"\n");
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate queue name"));
    }

    #[test]
    fn rejects_zero_attempts_and_concurrency() {
        assert!(validate_config(&parse("[delivery]\nattempts = 0\n")).is_err());
        assert!(validate_config(&parse("[rss]\nconcurrency = 0\n")).is_err());
        assert!(validate_config(&parse("[collector]\nlisten = \"nope\"\n")).is_err());
    }

    #[test]
    fn absolute_db_path_is_kept() {
        let config = parse("[database]\npath = \"/var/lib/collector.db\"\n");
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/collector.db"));
    }
}

//! Configuration loading and typed config structures.
//!
//! The configuration lives in `stressfeed-config.yaml` in the working
//! directory, or wherever `STRESSFEED_CONFIG` points. A missing file means
//! defaults. Connection settings can be overridden from the environment
//! so deployments do not need to edit the file:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `NATS_URL` | `push_feed.url` |
//! | `NATS_USER` | `push_feed.user` |
//! | `NATS_PASSWORD` | `push_feed.password` |
//! | `TTN_APPLICATION_ID` | `push_feed.application_id` |
//! | `DATABASE_URL` | `database.url` |
//! | `S3_BUCKET_NAME` | `object_store.bucket` |
//! | `AWS_DEFAULT_REGION` | `object_store.region` |
//! | `AWS_ACCESS_KEY_ID` | `object_store.access_key_id` |
//! | `AWS_SECRET_ACCESS_KEY` | `object_store.secret_access_key` |
//! | `S3_ENDPOINT` | `object_store.endpoint` |
//!
//! An adapter whose required value (`push_feed.url`, `object_store.bucket`,
//! `database.url`) is absent stays disabled.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use stressfeed_server::{ServerConfig, StreamSettings};
use stressfeed_sources::{BucketConfig, DEFAULT_PREFIX, PostgresConfig, PushFeedConfig};

/// Default config file name.
pub const DEFAULT_CONFIG_PATH: &str = "stressfeed-config.yaml";

/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "STRESSFEED_CONFIG";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level daemon configuration. Mirrors `stressfeed-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StressfeedConfig {
    /// HTTP listener.
    #[serde(default)]
    pub server: ServerSection,

    /// Broker push feed.
    #[serde(default)]
    pub push_feed: PushFeedSection,

    /// Object-store bucket polling.
    #[serde(default)]
    pub object_store: ObjectStoreSection,

    /// Document-database polling and webhook storage.
    #[serde(default)]
    pub database: DatabaseSection,

    /// Live-update stream tuning.
    #[serde(default)]
    pub stream: StreamSection,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl StressfeedConfig {
    /// Load from `STRESSFEED_CONFIG` or the default path, then apply
    /// environment overrides. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Where [`StressfeedConfig::load`] looks for the file.
    pub fn path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    }

    /// Load configuration from a YAML file, without environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Override connection settings from `lookup` (normally the process
    /// environment). Unset variables leave the field alone.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut Option<String>, key: &str| {
            if let Some(val) = lookup(key) {
                *target = Some(val);
            }
        };
        set(&mut self.push_feed.url, "NATS_URL");
        set(&mut self.push_feed.user, "NATS_USER");
        set(&mut self.push_feed.password, "NATS_PASSWORD");
        set(&mut self.database.url, "DATABASE_URL");
        set(&mut self.object_store.bucket, "S3_BUCKET_NAME");
        set(&mut self.object_store.access_key_id, "AWS_ACCESS_KEY_ID");
        set(&mut self.object_store.secret_access_key, "AWS_SECRET_ACCESS_KEY");
        set(&mut self.object_store.endpoint, "S3_ENDPOINT");

        if let Some(val) = lookup("TTN_APPLICATION_ID") {
            self.push_feed.application_id = val;
        }
        if let Some(val) = lookup("AWS_DEFAULT_REGION") {
            self.object_store.region = val;
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSection {
    /// As the HTTP crate's config.
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Broker push-feed settings. Disabled without `url`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushFeedSection {
    /// NATS server URL.
    #[serde(default)]
    pub url: Option<String>,

    /// User name.
    #[serde(default)]
    pub user: Option<String>,

    /// Password.
    #[serde(default)]
    pub password: Option<String>,

    /// Application whose device uplinks are followed.
    #[serde(default = "default_application_id")]
    pub application_id: String,
}

impl PushFeedSection {
    /// Adapter settings, or `None` when the feed is not configured.
    pub fn to_adapter_config(&self) -> Option<PushFeedConfig> {
        let url = self.url.as_ref().filter(|u| !u.trim().is_empty())?;
        Some(PushFeedConfig {
            url: url.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            application_id: self.application_id.clone(),
        })
    }
}

impl Default for PushFeedSection {
    fn default() -> Self {
        Self {
            url: None,
            user: None,
            password: None,
            application_id: default_application_id(),
        }
    }
}

/// Object-store polling settings. Disabled without `bucket`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObjectStoreSection {
    /// Bucket name.
    #[serde(default)]
    pub bucket: Option<String>,

    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Static access key.
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Static secret key.
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Endpoint for S3-compatible stores.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Key prefix to list.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Seconds between polls.
    #[serde(default = "default_object_store_poll_secs")]
    pub poll_interval_secs: u64,
}

impl ObjectStoreSection {
    /// Adapter settings, or `None` when the bucket is not configured.
    pub fn to_adapter_config(&self) -> Option<BucketConfig> {
        let bucket = self.bucket.as_ref().filter(|b| !b.trim().is_empty())?;
        Some(BucketConfig {
            bucket: bucket.clone(),
            region: self.region.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            endpoint: self.endpoint.clone(),
            prefix: self.prefix.clone(),
        })
    }

    /// Poll interval, at least one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for ObjectStoreSection {
    fn default() -> Self {
        Self {
            bucket: None,
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            endpoint: None,
            prefix: default_prefix(),
            poll_interval_secs: default_object_store_poll_secs(),
        }
    }
}

/// Document-database settings.
///
/// Without `url` the database adapter is disabled, unless `in_memory` is
/// set, in which case documents live in process memory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseSection {
    /// `PostgreSQL` URL.
    #[serde(default)]
    pub url: Option<String>,

    /// Keep documents in memory instead (development).
    #[serde(default)]
    pub in_memory: bool,

    /// Run migrations at startup.
    #[serde(default = "default_true")]
    pub run_migrations: bool,

    /// Maximum pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds between polls.
    #[serde(default = "default_database_poll_secs")]
    pub poll_interval_secs: u64,
}

impl DatabaseSection {
    /// Pool settings, or `None` when no URL is configured.
    pub fn to_postgres_config(&self) -> Option<PostgresConfig> {
        let url = self.url.as_ref().filter(|u| !u.trim().is_empty())?;
        Some(PostgresConfig::new(url).with_max_connections(self.max_connections))
    }

    /// Poll interval, at least one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: None,
            in_memory: false,
            run_migrations: default_true(),
            max_connections: default_max_connections(),
            poll_interval_secs: default_database_poll_secs(),
        }
    }
}

/// Live-update stream tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamSection {
    /// Seconds between keepalive messages.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Reconnect delay advertised to clients, in milliseconds.
    #[serde(default = "default_retry_ms")]
    pub retry_ms: u64,

    /// Per-session reading buffer.
    #[serde(default = "default_stream_buffer")]
    pub buffer: usize,
}

impl StreamSection {
    /// As the HTTP crate's settings.
    pub fn to_settings(&self) -> StreamSettings {
        StreamSettings {
            keepalive: Duration::from_secs(self.keepalive_secs.max(1)),
            retry: Duration::from_millis(self.retry_ms),
            buffer: self.buffer.max(1),
        }
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
            retry_ms: default_retry_ms(),
            buffer: default_stream_buffer(),
        }
    }
}

/// Log output settings. `RUST_LOG` wins over `level` when set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    3000
}

fn default_application_id() -> String {
    String::from("mo-lora-lora-no")
}

fn default_region() -> String {
    String::from("us-east-1")
}

fn default_prefix() -> String {
    String::from(DEFAULT_PREFIX)
}

const fn default_object_store_poll_secs() -> u64 {
    30
}

const fn default_database_poll_secs() -> u64 {
    10
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_true() -> bool {
    true
}

const fn default_keepalive_secs() -> u64 {
    30
}

const fn default_retry_ms() -> u64 {
    5000
}

const fn default_stream_buffer() -> usize {
    64
}

fn default_log_level() -> String {
    String::from("info")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn empty_yaml_gives_defaults_with_every_adapter_disabled() {
        let config = StressfeedConfig::parse("{}").unwrap();
        assert_eq!(config, StressfeedConfig::default());
        assert!(config.push_feed.to_adapter_config().is_none());
        assert!(config.object_store.to_adapter_config().is_none());
        assert!(config.database.to_postgres_config().is_none());
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.object_store.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.database.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.stream.to_settings().retry, Duration::from_secs(5));
    }

    #[test]
    fn parses_full_file() {
        let yaml = r"
server:
  port: 8080
push_feed:
  url: nats://broker:4222
  application_id: stress-app
object_store:
  bucket: uplinks
  region: eu-west-1
  prefix: data/
  poll_interval_secs: 15
database:
  in_memory: true
stream:
  keepalive_secs: 10
logging:
  level: debug
  json: true
";
        let config = StressfeedConfig::parse(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");

        let push = config.push_feed.to_adapter_config().unwrap();
        assert_eq!(push.url, "nats://broker:4222");
        assert_eq!(push.application_id, "stress-app");

        let bucket = config.object_store.to_adapter_config().unwrap();
        assert_eq!(bucket.region, "eu-west-1");
        assert_eq!(bucket.prefix, "data/");
        assert_eq!(config.object_store.poll_interval(), Duration::from_secs(15));

        assert!(config.database.in_memory);
        assert_eq!(config.stream.to_settings().keepalive, Duration::from_secs(10));
        assert!(config.logging.json);
    }

    #[test]
    fn environment_overrides_win() {
        let env: BTreeMap<&str, &str> = [
            ("NATS_URL", "nats://env:4222"),
            ("TTN_APPLICATION_ID", "env-app"),
            ("DATABASE_URL", "postgresql://env/db"),
            ("S3_BUCKET_NAME", "env-bucket"),
            ("AWS_DEFAULT_REGION", "ap-south-1"),
        ]
        .into_iter()
        .collect();

        let mut config = StressfeedConfig::parse("push_feed:\n  url: nats://file:4222\n").unwrap();
        config.apply_env_overrides(|key| env.get(key).map(|v| (*v).to_owned()));

        assert_eq!(config.push_feed.url.as_deref(), Some("nats://env:4222"));
        assert_eq!(config.push_feed.application_id, "env-app");
        assert_eq!(config.database.url.as_deref(), Some("postgresql://env/db"));
        assert_eq!(config.object_store.bucket.as_deref(), Some("env-bucket"));
        assert_eq!(config.object_store.region, "ap-south-1");
        assert!(config.object_store.access_key_id.is_none());
    }

    #[test]
    fn blank_required_values_keep_adapters_disabled() {
        let config = StressfeedConfig::parse("push_feed:\n  url: \"  \"\nobject_store:\n  bucket: \"\"\n").unwrap();
        assert!(config.push_feed.to_adapter_config().is_none());
        assert!(config.object_store.to_adapter_config().is_none());
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let config = StressfeedConfig::parse(
            "object_store:\n  poll_interval_secs: 0\nstream:\n  keepalive_secs: 0\n  buffer: 0\n",
        )
        .unwrap();
        assert_eq!(config.object_store.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.stream.to_settings().keepalive, Duration::from_secs(1));
        assert_eq!(config.stream.to_settings().buffer, 1);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            StressfeedConfig::parse("server: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}

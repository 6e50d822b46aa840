//! Configuration module for the Bracelet platform client.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub oauth: OauthConfig,
    pub upload: UploadConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// REST API endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Origin of the API server, e.g. `https://api.example.org`.
    pub host: String,
    /// Version prefix prepended to every resource path.
    pub api_version: String,
    /// Default `limit` applied to searches that set none.
    pub page_size: u32,
    /// Upper bound used by "fetch everything" lookups.
    pub page_max_size: u32,
    /// Hosts (`host:port`) whose absolute URLs are re-rooted on `host`.
    /// Used when the API hands out links addressed to a reverse proxy.
    pub rewrite_hosts: Vec<String>,
}

/// OAuth client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OauthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    /// Seconds before expiry at which the access token is refreshed.
    pub refresh_margin_secs: u64,
}

/// Retry delay between failed part uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64, max_ms: u64 },
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (1-based: the delay after the
    /// first failure is `delay(1)`).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            BackoffConfig::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            BackoffConfig::Exponential { base_ms, max_ms } => {
                let factor = 1u64 << attempt.saturating_sub(1).min(20);
                Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }
}

/// Blob upload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Size of each multipart chunk (in MiB).
    pub chunk_size_mb: u64,
    /// Concurrent part uploads per file.
    pub workers: usize,
    /// Total attempts per part, first try included.
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl UploadConfig {
    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mb * 1024 * 1024
    }
}

/// Where the session token is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// System keyring (Secret Service)
    #[default]
    Keyring,
    /// JSON files under `storage.dir`
    File,
    /// Process memory only
    Memory,
}

/// Token storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the `file` backend.
    pub dir: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/bracelet/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("bracelet")
            .join("config.yaml")
    }

    /// API root: host plus version prefix, without a trailing slash.
    pub fn api_root(&self) -> String {
        format!(
            "{}{}",
            self.api.host.trim_end_matches('/'),
            self.api.api_version.trim_end_matches('/')
        )
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:8001".to_string(),
            api_version: "/v1".to_string(),
            page_size: 50,
            page_max_size: 500,
            rewrite_hosts: vec!["host.docker.internal:8001".to_string()],
        }
    }
}

impl Default for OauthConfig {
    fn default() -> Self {
        Self {
            client_id: Some("bracelet-platform".to_string()),
            client_secret: None,
            scope: None,
            refresh_margin_secs: 30,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Fixed { delay_ms: 10 }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_mb: 5,
            workers: 4,
            max_attempts: 5,
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("bracelet"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"upload.workers"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, ok: bool| {
            if !ok {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        positive("api.page_size", self.api.page_size > 0);
        positive("api.page_max_size", self.api.page_max_size > 0);
        positive("upload.chunk_size_mb", self.upload.chunk_size_mb > 0);
        positive("upload.workers", self.upload.workers > 0);
        positive("upload.max_attempts", self.upload.max_attempts > 0);

        // --- api ---
        match url::Url::parse(&self.api.host) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => errors.push(ValidationError {
                field: "api.host".into(),
                message: format!("not an http(s) origin: {}", self.api.host),
            }),
        }
        if !self.api.api_version.is_empty() && !self.api.api_version.starts_with('/') {
            errors.push(ValidationError {
                field: "api.api_version".into(),
                message: "must start with '/'".into(),
            });
        }
        if self.api.page_size > self.api.page_max_size {
            errors.push(ValidationError {
                field: "api.page_size".into(),
                message: format!(
                    "must not exceed api.page_max_size ({})",
                    self.api.page_max_size
                ),
            });
        }

        // --- upload ---
        if let BackoffConfig::Exponential { base_ms, max_ms } = self.upload.backoff {
            if base_ms > max_ms {
                errors.push(ValidationError {
                    field: "upload.backoff".into(),
                    message: "base_ms must not exceed max_ms".into(),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Config`], starting from defaults.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder pre-populated with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn api_host(mut self, host: impl Into<String>) -> Self {
        self.config.api.host = host.into();
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.config.api.api_version = version.into();
        self
    }

    pub fn api_page_size(mut self, n: u32) -> Self {
        self.config.api.page_size = n;
        self
    }

    pub fn api_rewrite_hosts(mut self, hosts: Vec<String>) -> Self {
        self.config.api.rewrite_hosts = hosts;
        self
    }

    pub fn oauth_client(mut self, id: Option<String>, secret: Option<String>) -> Self {
        self.config.oauth.client_id = id;
        self.config.oauth.client_secret = secret;
        self
    }

    pub fn oauth_scope(mut self, scope: impl Into<String>) -> Self {
        self.config.oauth.scope = Some(scope.into());
        self
    }

    pub fn upload_workers(mut self, n: usize) -> Self {
        self.config.upload.workers = n;
        self
    }

    pub fn upload_max_attempts(mut self, n: u32) -> Self {
        self.config.upload.max_attempts = n;
        self
    }

    pub fn upload_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.upload.backoff = backoff;
        self
    }

    pub fn storage_backend(mut self, backend: StorageBackend) -> Self {
        self.config.storage.backend = backend;
        self
    }

    pub fn storage_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.dir = dir;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the config (no validation).
    pub fn build(self) -> Config {
        self.config
    }

    /// Consume the builder, validate, and return the config or errors.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

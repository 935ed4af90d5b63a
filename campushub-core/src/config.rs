use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub redis: RedisConfig,
    pub smtp: SmtpConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Redis configuration
///
/// When no URL is configured the dispatch queue falls back to its
/// in-memory job store (single-process only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: "campushub:".to_string(),
        }
    }
}

/// SMTP configuration for the email delivery channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
    pub use_tls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_email: String::new(),
            from_name: "CampusHub".to_string(),
            use_tls: true,
        }
    }
}

impl SmtpConfig {
    /// Whether an SMTP relay has been configured at all
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.smtp_host.is_empty()
    }
}

/// Dispatch queue and worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of concurrent delivery workers
    pub worker_count: usize,
    /// Retry ceiling; a job failing this many attempts is failed_permanent
    pub max_attempts: u32,
    /// First retry delay of the exponential backoff schedule
    pub backoff_min_seconds: u64,
    /// Backoff cap
    pub backoff_max_seconds: u64,
    /// Per-attempt delivery timeout
    pub attempt_timeout_seconds: u64,
    /// Idle worker poll interval
    pub poll_interval_ms: u64,
    /// How long a claimed job stays invisible to other workers (Redis backend)
    pub visibility_timeout_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_attempts: 5,
            backoff_min_seconds: 10,
            backoff_max_seconds: 600,
            attempt_timeout_seconds: 30,
            poll_interval_ms: 500,
            visibility_timeout_seconds: 60,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (CAMPUSHUB_DISPATCH_MAX_ATTEMPTS, etc.)
        builder = builder.add_source(
            Environment::with_prefix("CAMPUSHUB")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }
}

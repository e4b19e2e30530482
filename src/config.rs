use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_url() -> String { crate::services::ratings::DEFAULT_API_URL.to_string() }
fn default_connect_timeout_secs() -> u64 { 5 }
fn default_request_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_max_calls")]
    pub max_calls: usize,
    #[serde(default = "default_period_secs")]
    pub period_secs: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            period_secs: default_period_secs(),
        }
    }
}

// Matches the server's DoS protection, found empirically
fn default_max_calls() -> usize { 5 }
fn default_period_secs() -> f64 { 1.0 }

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_max_attempts() -> u32 { 10 }
fn default_backoff_base_ms() -> u64 { 500 }

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { max_size: default_max_size() }
    }
}

fn default_max_size() -> usize { crate::services::ratings::DEFAULT_MAX_BATCH_SIZE }

#[derive(Debug, Clone, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_input")]
    pub input: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_skipped_output")]
    pub skipped_output: PathBuf,
    #[serde(default = "default_missing_output")]
    pub missing_output: PathBuf,
    /// Only process the first `limit` battles of the input
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            skipped_output: default_skipped_output(),
            missing_output: default_missing_output(),
            limit: None,
        }
    }
}

fn default_input() -> PathBuf { PathBuf::from("public/data/live.json") }
fn default_output() -> PathBuf { PathBuf::from("demos/fullwhr.json") }
fn default_skipped_output() -> PathBuf { PathBuf::from("demos/fullwhr-skipped.json") }
fn default_missing_output() -> PathBuf { PathBuf::from("demos/fullwhr-missing.json") }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "compact".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with WHR_)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., WHR__RATE_LIMIT__MAX_CALLS -> rate_limit.max_calls
            .add_source(env_source())
            .build()?;

        let settings: Settings = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;

        let settings: Settings = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would stall or break a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_calls == 0 {
            return Err(ConfigError::Message("rate_limit.max_calls must be at least 1".into()));
        }
        if !(self.rate_limit.period_secs.is_finite() && self.rate_limit.period_secs > 0.0) {
            return Err(ConfigError::Message("rate_limit.period_secs must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message("retry.max_attempts must be at least 1".into()));
        }
        if self.batch.max_size == 0 {
            return Err(ConfigError::Message("batch.max_size must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("WHR")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

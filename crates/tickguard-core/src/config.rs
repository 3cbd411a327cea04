//! Client configuration.
//!
//! Defaults suit a local backend. Every value can be overridden from the
//! environment:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `TICKGUARD_BASE_URL` | `http://localhost:8000` | Backend origin plus optional prefix |
//! | `TICKGUARD_TIMEOUT_MS` | `10000` | Per-attempt timeout |
//! | `TICKGUARD_MAX_ATTEMPTS` | `3` | Attempts per call, first one included |
//! | `TICKGUARD_BASE_DELAY_MS` | `1000` | First backoff delay |
//! | `TICKGUARD_CACHE_TTL_SECS` | `300` | Default TTL for cached calls |
//! | `TICKGUARD_CREDENTIALS_PATH` | unset | File backing the credential pair |

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
    pub credentials_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::from(DEFAULT_BASE_URL),
            timeout_ms: 10_000,
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(300),
            credentials_path: None,
        }
    }
}

impl ClientConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads overrides through `lookup`, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base_url) = lookup("TICKGUARD_BASE_URL") {
            config = config.with_base_url(base_url)?;
        }
        if let Some(value) = lookup("TICKGUARD_TIMEOUT_MS") {
            config.timeout_ms = parse_number("TICKGUARD_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("TICKGUARD_MAX_ATTEMPTS") {
            let attempts = parse_number("TICKGUARD_MAX_ATTEMPTS", &value)?;
            config = config.with_max_attempts(u32::try_from(attempts).unwrap_or(u32::MAX))?;
        }
        if let Some(value) = lookup("TICKGUARD_BASE_DELAY_MS") {
            let millis = parse_number("TICKGUARD_BASE_DELAY_MS", &value)?;
            config = config.with_base_delay(Duration::from_millis(millis));
        }
        if let Some(value) = lookup("TICKGUARD_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(parse_number("TICKGUARD_CACHE_TTL_SECS", &value)?);
        }
        if let Some(path) = lookup("TICKGUARD_CREDENTIALS_PATH").filter(|path| !path.is_empty()) {
            config.credentials_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl { value: base_url });
        }
        self.base_url = base_url.trim_end_matches('/').to_owned();
        Ok(self)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::Zero {
                field: "max_attempts",
            });
        }
        self.retry.max_attempts = max_attempts;
        Ok(self)
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.retry = RetryPolicy::new(self.retry.max_attempts, base_delay);
        self
    }

    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Joins `path` onto the base url. Absolute urls pass through.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Whether `url` lies under the configured base url.
    ///
    /// Credentials are only ever sent to urls passing this check.
    pub fn is_backend_url(&self, url: &str) -> bool {
        url.strip_prefix(self.base_url.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?']))
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidNumber {
            var,
            value: value.to_owned(),
        })
}

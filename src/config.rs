//! Client configuration

use crate::{ProviderError, ProviderResult, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the API base URL
pub const ENV_API_URL: &str = "POLICY_API_URL";
/// Environment variable overriding the per-request timeout (seconds)
pub const ENV_TIMEOUT_SECS: &str = "POLICY_API_TIMEOUT_SECS";
/// Environment variable overriding the attempt budget
pub const ENV_MAX_RETRIES: &str = "POLICY_API_MAX_RETRIES";

/// Configuration for the HTTP backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL for API requests (e.g., "https://acl.example.com/api/v2").
    pub base_url: String,

    /// Path segment of the policy collection under `base_url`.
    #[serde(default = "default_collection_path")]
    pub collection_path: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// User-Agent header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Retry configuration with exponential backoff.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_collection_path() -> String {
    "policies".to_owned()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned()
}

impl ClientConfig {
    /// Create a config with required fields.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            collection_path: default_collection_path(),
            request_timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            retry: RetryPolicy::default(),
        }
    }

    /// Build from `POLICY_API_*` environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ProviderResult<Self> {
        let base_url = lookup(ENV_API_URL)
            .ok_or_else(|| ProviderError::Config(format!("{ENV_API_URL} is not set").into()))?;
        let mut config = Self::new(base_url);

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            config.request_timeout_secs = raw.trim().parse().map_err(|_| {
                ProviderError::Config(format!("{ENV_TIMEOUT_SECS} must be a number, got {raw:?}").into())
            })?;
        }
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            config.retry.max_attempts = raw.trim().parse().map_err(|_| {
                ProviderError::Config(format!("{ENV_MAX_RETRIES} must be a number, got {raw:?}").into())
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the collection path.
    pub fn with_collection_path(mut self, path: impl Into<String>) -> Self {
        self.collection_path = path.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check the configuration before building a client.
    pub fn validate(&self) -> ProviderResult<url::Url> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Config(format!("base_url {:?}: {e}", self.base_url).into()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProviderError::Config(
                format!("base_url must use http or https, got {}", url.scheme()).into(),
            ));
        }
        if url.cannot_be_a_base() {
            return Err(ProviderError::Config("base_url cannot be a base URL".into()));
        }
        if self.collection_path.trim_matches('/').is_empty() {
            return Err(ProviderError::Config("collection_path must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ProviderError::Config("request timeout must be positive".into()));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ProviderError::Config("backoff_multiplier must be at least 1.0".into()));
        }
        Ok(url)
    }
}

//! Configuration for the steadycall client

use crate::error::{Error, Result};
use std::time::Duration;
use steadycall_core::retry::{DEFAULT_BASE, DEFAULT_MAX_RETRIES, DEFAULT_STEP, LinearBackoff, RetryEngine};
use steadycall_transport::{DEFAULT_ATTEMPT_TIMEOUT, HttpConnectorConfig};

/// Default endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://localhost:5001";

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a resilient client.
///
/// Supplied at construction by whatever bootstraps the process; the client
/// never reads configuration on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Target endpoint address
    pub endpoint: String,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Wait before the first retry
    pub base_backoff: Duration,

    /// Extra wait added per further retry
    pub backoff_step: Duration,

    /// Timeout of each physical attempt
    pub attempt_timeout: Duration,

    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: DEFAULT_BASE,
            backoff_step: DEFAULT_STEP,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Configuration for `endpoint` with default retry settings.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first, if present.
    /// This will look for:
    /// - `STEADYCALL_ENDPOINT` for the target endpoint
    /// - `STEADYCALL_MAX_RETRIES` for the retry budget
    /// - `STEADYCALL_BASE_BACKOFF_MS` for the first wait
    /// - `STEADYCALL_BACKOFF_STEP_MS` for the per-retry increment
    /// - `STEADYCALL_ATTEMPT_TIMEOUT_MS` for the per-attempt timeout
    /// - `STEADYCALL_CONNECT_TIMEOUT_MS` for the connect timeout
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but not a number, or
    /// if the resulting configuration fails [`validate`](Self::validate).
    #[cfg(feature = "env")]
    pub fn from_env() -> Result<Self> {
        use std::env;

        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Ok(endpoint) = env::var("STEADYCALL_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(max_retries) = env_number::<u32>("STEADYCALL_MAX_RETRIES")? {
            config.max_retries = max_retries;
        }
        if let Some(ms) = env_number::<u64>("STEADYCALL_BASE_BACKOFF_MS")? {
            config.base_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number::<u64>("STEADYCALL_BACKOFF_STEP_MS")? {
            config.backoff_step = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number::<u64>("STEADYCALL_ATTEMPT_TIMEOUT_MS")? {
            config.attempt_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number::<u64>("STEADYCALL_CONNECT_TIMEOUT_MS")? {
            config.connect_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the client cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an endpoint that is not an http(s) URL
    /// or a zero attempt timeout.
    pub fn validate(&self) -> Result<()> {
        HttpConnectorConfig::new(&self.endpoint).map_err(|e| Error::Config(e.to_string()))?;
        if self.attempt_timeout.is_zero() {
            return Err(Error::Config("attempt timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// The backoff schedule described by this configuration.
    pub fn backoff(&self) -> LinearBackoff {
        LinearBackoff::new(self.base_backoff, self.backoff_step)
    }

    /// A retry engine with the default classifier and this configuration's
    /// schedule and budget.
    pub fn engine(&self) -> RetryEngine {
        RetryEngine::builder()
            .max_retries(self.max_retries)
            .backoff(self.backoff())
            .build()
    }

    /// HTTP connector settings for this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint is not an http(s) URL.
    pub fn http_connector(&self) -> Result<HttpConnectorConfig> {
        Ok(HttpConnectorConfig::new(&self.endpoint)
            .map_err(|e| Error::Config(e.to_string()))?
            .with_connect_timeout(self.connect_timeout))
    }
}

#[cfg(feature = "env")]
fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} must be a non-negative integer, got {raw:?}"))),
        Err(_) => Ok(None),
    }
}

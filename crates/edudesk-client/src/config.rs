//! Client and monitor configuration.

use std::time::Duration;

use url::Url;

use crate::error::ApiError;

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("edudesk-client/", env!("CARGO_PKG_VERSION"));

/// Default API base URL (local development server).
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/";

/// Configurable options for the API client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL all request paths are joined against.
    pub base_url: Url,

    /// Overall timeout for one HTTP request (default: 10 seconds).
    pub request_timeout: Duration,

    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Maximum idle connections to keep per host.
    pub pool_max_idle_per_host: usize,

    /// Duration to keep idle connections alive before closing.
    pub pool_idle_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Create a config pointing at the given base URL.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Ok(Self::default().with_base_url(base_url)?)
    }

    /// Replace the base URL.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ApiError> {
        self.base_url = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidConfig(format!("invalid base URL {base_url:?}: {e}")))?;
        self
            .base_url
            .host_str()
            .ok_or_else(|| ApiError::InvalidConfig(format!("base URL {base_url:?} has no host")))?;
        Ok(self)
    }

    /// Replace the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Replace the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Create a ClientConfig from environment variables.
    ///
    /// Environment variables:
    /// - `EDUDESK_BASE_URL`: API base URL (default: `http://localhost:8000/`)
    /// - `EDUDESK_REQUEST_TIMEOUT_SECS`: request timeout in seconds (default: 10)
    ///
    /// Unset or unparsable values fall back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base) = std::env::var("EDUDESK_BASE_URL")
            && let Ok(updated) = config.clone().with_base_url(&base)
        {
            config = updated;
        }

        if let Some(secs) = std::env::var("EDUDESK_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.request_timeout = Duration::from_secs(secs);
        }

        config
    }
}

/// Configurable options for the connectivity monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Path of the liveness endpoint, joined against the client base URL.
    pub probe_path: String,

    /// Timeout for one reachability probe (default: 5 seconds).
    ///
    /// Deliberately shorter than the API request timeout so a hung probe
    /// cannot hold the single-flight slot for a full request window.
    pub probe_timeout: Duration,

    /// Interval between scheduled probes while in the foreground
    /// (default: 60 seconds).
    pub interval: Duration,

    /// Consecutive failed probes required to leave the online state.
    pub failure_threshold: u32,

    /// Consecutive successful probes required to leave the offline state.
    pub success_threshold: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_path: "/api/ping".to_owned(),
            probe_timeout: Duration::from_secs(5),
            interval: Duration::from_secs(60),
            failure_threshold: 2,
            success_threshold: 2,
        }
    }
}

impl MonitorConfig {
    /// Create a MonitorConfig from environment variables.
    ///
    /// Environment variables:
    /// - `EDUDESK_PROBE_INTERVAL_SECS`: probe interval in seconds (default: 60)
    /// - `EDUDESK_PROBE_TIMEOUT_SECS`: probe timeout in seconds (default: 5)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = std::env::var("EDUDESK_PROBE_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.interval = Duration::from_secs(secs);
        }

        if let Some(secs) = std::env::var("EDUDESK_PROBE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.probe_timeout = Duration::from_secs(secs);
        }

        config
    }
}

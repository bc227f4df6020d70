//! Client error taxonomy.

use thiserror::Error;

/// Errors surfaced by the request pipeline and connectivity monitor.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Access token rejected with no usable refresh path - re-login required.
    #[error("Session expired - re-login required")]
    AuthExpired,

    /// Refresh exchange rejected or errored - re-login required.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Transport-level failure (timeout, DNS, connection refused).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-auth HTTP failure, surfaced unmodified for the caller to interpret.
    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Token storage error.
    #[error("Token storage error: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// Check if this error requires manual re-login.
    pub fn requires_relogin(&self) -> bool {
        matches!(self, Self::AuthExpired | Self::RefreshFailed(_))
    }

    /// Check if this error is transient and the caller may try again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

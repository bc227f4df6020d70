//! Core client plumbing for the edudesk school platform.
//!
//! Two halves, usable separately or together:
//!
//! - [`auth`]: the authenticated request pipeline. Attaches the stored
//!   access token to every request, transparently refreshes it once on a
//!   401, and ends the session when the refresh path is unusable.
//! - [`connectivity`]: the connectivity monitor. Probes the backend on an
//!   interval, debounces the results through a hysteresis state machine and
//!   publishes a stable online/offline state.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use edudesk_client::auth::{AuthPipeline, FileTokenStore, ReqwestTransport};
//! use edudesk_client::config::ClientConfig;
//!
//! # async fn demo() -> Result<(), edudesk_client::error::ApiError> {
//! let config = ClientConfig::new("https://school.example.com/")?;
//! let transport = Arc::new(ReqwestTransport::new(config)?);
//! let store = Arc::new(FileTokenStore::new("tokens.json"));
//! let pipeline = AuthPipeline::new(transport, store);
//!
//! let students: serde_json::Value = pipeline.get_json("/api/students/").await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod connectivity;
pub mod error;

pub use auth::{AuthPipeline, TokenPair, TokenStore};
pub use reqwest::{Method, StatusCode};
pub use config::{ClientConfig, MonitorConfig};
pub use connectivity::{ConnectivityMonitor, LinkState, NetworkSignal};
pub use error::ApiError;

/// Convenience alias for pipeline and monitor results.
pub type Result<T> = std::result::Result<T, ApiError>;

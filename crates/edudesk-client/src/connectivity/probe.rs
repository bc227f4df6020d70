//! Reachability probing.

use async_trait::async_trait;
use rand::RngExt;
use reqwest::Client;
use tracing::trace;
use url::Url;

use crate::config::{ClientConfig, MonitorConfig};
use crate::error::ApiError;

/// One-shot backend reachability check.
///
/// A probe answers "did the liveness endpoint answer healthily", nothing
/// about authorization or payload. The monitor owns scheduling and dedup.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Run one probe. `Ok` means the backend answered with a 2xx in time.
    async fn probe(&self) -> Result<(), ApiError>;
}

/// HTTP probe against the liveness endpoint.
///
/// Carries its own client so the probe timeout stays independent of the API
/// request timeout, and no Authorization header ever leaks into probes.
pub struct HttpProbe {
    client: Client,
    url: Url,
}

impl HttpProbe {
    /// Build a probe from the client and monitor configs.
    pub fn new(client: &ClientConfig, monitor: &MonitorConfig) -> Result<Self, ApiError> {
        let url = client
            .base_url
            .join(monitor.probe_path.trim_start_matches('/'))
            .map_err(|e| {
                ApiError::InvalidConfig(format!(
                    "cannot join probe path {:?}: {e}",
                    monitor.probe_path
                ))
            })?;

        let http = Client::builder()
            .timeout(monitor.probe_timeout)
            .connect_timeout(monitor.probe_timeout)
            .user_agent(client.user_agent.clone())
            .build()?;

        Ok(Self { client: http, url })
    }

    /// The probe target, before the cache-bust query is added.
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn bust_cache(&self) -> Url {
        // Unique per probe so no intermediary can answer from cache and fake
        // a reachable backend.
        let stamp = format!(
            "{}-{}",
            chrono::Utc::now().timestamp_millis(),
            rand::rng().random::<u32>()
        );
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("ts", &stamp);
        url
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> Result<(), ApiError> {
        let url = self.bust_cache();
        trace!(url = %url, "probing backend");

        let response = self.client.get(url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::Status {
                status: response.status(),
                body: String::new(),
            })
        }
    }
}

//! HTTP transport seam.
//!
//! The pipeline talks to the network through [`HttpTransport`], so tests can
//! swap in scripted transports and the retry logic stays independent of any
//! particular HTTP client.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::ApiError;

/// A single API request, independent of any HTTP client.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method.
    pub method: Method,
    /// Path joined against the client base URL.
    pub path: String,
    /// Query parameters appended to the URL.
    pub query: Vec<(String, String)>,
    /// Extra headers beyond the ones the transport sets itself.
    pub headers: Vec<(String, String)>,
    /// Optional JSON body, already serialized.
    pub body: Option<Bytes>,
    /// Set by the pipeline on the single permitted retry after a refresh.
    pub retried: bool,
}

impl RequestDescriptor {
    /// Create a descriptor with no query, headers or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            retried: false,
        }
    }

    /// Shorthand for a GET descriptor.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a POST descriptor.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Shorthand for a PUT descriptor.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Shorthand for a PATCH descriptor.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Shorthand for a DELETE descriptor.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn with_json<T: serde::Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }
}

/// A completed HTTP response with the body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: Bytes,
}

impl ApiResponse {
    /// Check for a 2xx status.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// The body as lossy UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport abstraction the pipeline dispatches through.
///
/// Implementations perform exactly one HTTP exchange per call. They never
/// retry, refresh or interpret auth failures; that is the pipeline's job.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute one request, attaching `bearer` as the Authorization header
    /// when present. Transport failures (timeout, DNS, refused connection)
    /// surface as [`ApiError::Network`]; any HTTP status is a success here.
    async fn execute(
        &self,
        request: &RequestDescriptor,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ApiError>;
}

/// reqwest-backed transport.
pub struct ReqwestTransport {
    client: Client,
    config: ClientConfig,
}

impl ReqwestTransport {
    /// Build a transport from the given config.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// The config this transport was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn build_url(&self, request: &RequestDescriptor) -> Result<url::Url, ApiError> {
        // Url::join treats an absolute path as replacing the base path, which
        // is what callers expect when base_url carries no path of its own.
        let mut url = self
            .config
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| {
                ApiError::InvalidConfig(format!("cannot join path {:?}: {e}", request.path))
            })?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: &RequestDescriptor,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.build_url(request)?;
        let mut builder = self.client.request(request.method.clone(), url);

        if let Some(token) = bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ApiError::InvalidConfig(format!("invalid bearer token: {e}")))?;
            builder = builder.header(AUTHORIZATION, value);
        }

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::InvalidConfig(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::InvalidConfig(format!("invalid header value: {e}")))?;
            builder = builder.header(name, value);
        }

        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builders() {
        let desc = RequestDescriptor::get("/api/students/")
            .with_query("page", "2")
            .with_header("X-Request-Id", "abc");
        assert_eq!(desc.method, Method::GET);
        assert_eq!(desc.path, "/api/students/");
        assert_eq!(desc.query, vec![("page".to_owned(), "2".to_owned())]);
        assert!(desc.body.is_none());
    }

    #[test]
    fn test_descriptor_json_body() {
        let desc = RequestDescriptor::post("/api/students/")
            .with_json(&serde_json::json!({"name": "Ada"}))
            .unwrap();
        let body = desc.body.unwrap();
        assert_eq!(&body[..], br#"{"name":"Ada"}"#);
    }

    #[test]
    fn test_response_json_and_text() {
        let response = ApiResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(br#"{"id": 7}"#),
        };
        assert!(response.is_success());
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(response.text(), r#"{"id": 7}"#);
    }

    #[test]
    fn test_build_url_joins_path_and_query() {
        let config = ClientConfig::new("https://school.example.com/").unwrap();
        let transport = ReqwestTransport::new(config).unwrap();
        let desc = RequestDescriptor::get("/api/ping").with_query("ts", "123-456");
        let url = transport.build_url(&desc).unwrap();
        assert_eq!(url.as_str(), "https://school.example.com/api/ping?ts=123-456");
    }
}

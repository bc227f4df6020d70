//! Credential pair and token persistence.
//!
//! The pipeline owns a [`TokenStore`] rather than reading ambient global
//! state; stores are injectable so tests and multiple client instances can
//! run in isolation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::ApiError;

/// An access/refresh credential pair.
///
/// The access token authorizes API requests; the refresh token is used only
/// by the refresh exchange. An empty refresh token means no refresh path is
/// available.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived credential attached to every outgoing request.
    pub access: String,
    /// Longer-lived credential used solely to obtain a new access token.
    pub refresh: String,
}

impl TokenPair {
    /// Create a new credential pair.
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }

    /// Check if this pair carries a usable refresh token.
    #[inline]
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh.is_empty()
    }
}

/// Token bodies never reach logs; Debug shows a short prefix only.
impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &token_prefix(&self.access))
            .field("refresh", &token_prefix(&self.refresh))
            .finish()
    }
}

fn token_prefix(token: &str) -> String {
    const PREFIX_LEN: usize = 8;
    let end = token
        .char_indices()
        .nth(PREFIX_LEN)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    format!("{}***", &token[..end])
}

/// Credential persistence abstraction.
///
/// Mutated by the pipeline only; read by every outgoing request.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the current credential pair, if any.
    async fn load(&self) -> Result<Option<TokenPair>, ApiError>;

    /// Persist a full credential pair (login).
    async fn save(&self, pair: &TokenPair) -> Result<(), ApiError>;

    /// Replace only the access token, keeping the refresh token
    /// (the refresh exchange returns only a new access token).
    async fn update_access(&self, access: &str) -> Result<(), ApiError>;

    /// Clear both tokens together. Never leaves a partial pair behind.
    async fn clear(&self) -> Result<(), ApiError>;
}

/// In-memory token store.
pub struct MemoryTokenStore {
    inner: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Create a store seeded with a credential pair.
    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            inner: RwLock::new(Some(pair)),
        }
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<TokenPair>, ApiError> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, pair: &TokenPair) -> Result<(), ApiError> {
        *self.inner.write().await = Some(pair.clone());
        Ok(())
    }

    async fn update_access(&self, access: &str) -> Result<(), ApiError> {
        let mut guard = self.inner.write().await;
        match guard.as_mut() {
            Some(pair) => {
                pair.access = access.to_owned();
                Ok(())
            }
            None => Err(ApiError::Storage(
                "no credential pair to update".to_owned(),
            )),
        }
    }

    async fn clear(&self) -> Result<(), ApiError> {
        *self.inner.write().await = None;
        Ok(())
    }
}

/// File-backed token store.
///
/// JSON file on disk, written atomically (temp file + rename). A missing or
/// corrupt file loads as no credentials rather than an error, so a damaged
/// file degrades to a fresh login instead of a wedged client.
pub struct FileTokenStore {
    path: PathBuf,
    /// Serializes writers; the file itself has no locking.
    write_lock: RwLock<()>,
}

impl FileTokenStore {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: RwLock::new(()),
        }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_pair(&self) -> Result<Option<TokenPair>, ApiError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ApiError::Storage(e.to_string())),
        };

        match serde_json::from_slice::<TokenPair>(&bytes) {
            Ok(pair) => Ok(Some(pair)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt token file - treating as empty");
                Ok(None)
            }
        }
    }

    async fn write_pair(&self, pair: &TokenPair) -> Result<(), ApiError> {
        let bytes = serde_json::to_vec_pretty(pair)?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ApiError::Storage(e.to_string()))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<TokenPair>, ApiError> {
        let _guard = self.write_lock.read().await;
        self.read_pair().await
    }

    async fn save(&self, pair: &TokenPair) -> Result<(), ApiError> {
        let _guard = self.write_lock.write().await;
        self.write_pair(pair).await
    }

    async fn update_access(&self, access: &str) -> Result<(), ApiError> {
        let _guard = self.write_lock.write().await;
        match self.read_pair().await? {
            Some(mut pair) => {
                pair.access = access.to_owned();
                self.write_pair(&pair).await
            }
            None => Err(ApiError::Storage(
                "no credential pair to update".to_owned(),
            )),
        }
    }

    async fn clear(&self) -> Result<(), ApiError> {
        let _guard = self.write_lock.write().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::Storage(e.to_string())),
        }
    }
}

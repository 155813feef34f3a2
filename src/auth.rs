//! Access-token plumbing for the Code Assist upstream.
//!
//! Token acquisition and refresh are owned by the external OAuth flow; this
//! module only reads what that flow persisted and hands out bearer tokens.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

use crate::error::ProxyError;

/// Where bearer tokens come from. `invalidate` drops any cached token so the
/// next `access_token` call re-reads the backing store.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, ProxyError>;
    async fn invalidate(&self);
}

#[derive(Debug, Deserialize)]
struct OauthCreds {
    access_token: String,
}

/// Token source backed by the credentials file the OAuth collaborator keeps
/// at `~/.gemini/oauth_creds.json`.
pub struct OauthFileTokenSource {
    path: PathBuf,
    cached: Mutex<Option<String>>,
}

impl OauthFileTokenSource {
    pub fn new() -> Self {
        Self::at(gemini_dir().join("oauth_creds.json"))
    }

    pub fn at(path: PathBuf) -> Self {
        OauthFileTokenSource {
            path,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenSource for OauthFileTokenSource {
    async fn access_token(&self) -> Result<String, ProxyError> {
        if let Some(token) = self.cached.lock().unwrap().clone() {
            return Ok(token);
        }

        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ProxyError::Auth(format!(
                "cannot read credentials at {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let creds: OauthCreds = serde_json::from_str(&content)
            .map_err(|e| ProxyError::Auth(format!("malformed credentials file: {}", e)))?;

        debug!("loaded access token from {}", self.path.display());
        *self.cached.lock().unwrap() = Some(creds.access_token.clone());
        Ok(creds.access_token)
    }

    async fn invalidate(&self) {
        self.cached.lock().unwrap().take();
    }
}

/// `~/.gemini`, created on demand by the callers that persist state there.
pub fn gemini_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gemini")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_access_token_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_creds.json");
        std::fs::write(&path, r#"{"access_token":"ya29.test","expiry_date":0}"#).unwrap();

        let source = OauthFileTokenSource::at(path);
        assert_eq!(source.access_token().await.unwrap(), "ya29.test");
    }

    #[tokio::test]
    async fn test_invalidate_forces_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth_creds.json");
        std::fs::write(&path, r#"{"access_token":"first"}"#).unwrap();

        let source = OauthFileTokenSource::at(path.clone());
        assert_eq!(source.access_token().await.unwrap(), "first");

        std::fs::write(&path, r#"{"access_token":"second"}"#).unwrap();
        // Cached until invalidated
        assert_eq!(source.access_token().await.unwrap(), "first");
        source.invalidate().await;
        assert_eq!(source.access_token().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_missing_file_is_an_auth_error() {
        let source = OauthFileTokenSource::at(PathBuf::from("/nonexistent/creds.json"));
        assert!(matches!(
            source.access_token().await,
            Err(ProxyError::Auth(_))
        ));
    }
}

//! Error types for the proxy core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// Connection-level failure talking to the upstream.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx answer from the upstream, body preserved for classification.
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("authentication error: {0}")]
    Auth(String),

    /// Project discovery poll loop exhausted its attempts.
    #[error("onboarding did not complete in time")]
    OnboardingTimeout,
}

impl ProxyError {
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ProxyError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

//! Rate-limit detection and the single-hop model fallback policy.

use crate::error::ProxyError;
use crate::model_table;

/// Upstream statuses treated as rate limiting. 503 is included because the
/// Code Assist backend answers quota exhaustion with it under load.
const RATE_LIMIT_STATUSES: &[u16] = &[429, 503];

pub fn is_rate_limited(error: &ProxyError) -> bool {
    matches!(error.upstream_status(), Some(status) if RATE_LIMIT_STATUSES.contains(&status))
}

/// The model to re-drive the request with, when the error is a rate limit
/// and the current model is eligible for fallback.
pub fn fallback_model(error: &ProxyError, model: &str) -> Option<&'static str> {
    if !is_rate_limited(error) {
        return None;
    }
    model_table::fallback_for(model)
}

pub fn fallback_notice(from: &str, to: &str) -> String {
    format!(
        "[{} is rate-limited upstream; answering with {}]\n\n",
        from, to
    )
}

//! Authenticated client for the Code Assist API, including the one-shot
//! project-discovery handshake.

use crate::auth::TokenSource;
use crate::error::ProxyError;
use bytes::Bytes;
use futures::Stream;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CODE_ASSIST_ENDPOINT: &str = "https://cloudcode-pa.googleapis.com";
pub const CODE_ASSIST_API_VERSION: &str = "v1internal";

const DEFAULT_PROJECT: &str = "default-project";
const ONBOARD_ATTEMPTS: u32 = 30;
const ONBOARD_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct CodeAssistClient {
    http: Arc<reqwest::Client>,
    tokens: Arc<dyn TokenSource>,
    configured_project: Option<String>,
    discovered_project: tokio::sync::Mutex<Option<String>>,
}

impl CodeAssistClient {
    pub fn new(
        http: Arc<reqwest::Client>,
        tokens: Arc<dyn TokenSource>,
        configured_project: Option<String>,
    ) -> Self {
        CodeAssistClient {
            http,
            tokens,
            configured_project,
            discovered_project: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn generate_content(&self, body: &Value) -> Result<Value, ProxyError> {
        self.call("generateContent", body).await
    }

    pub async fn stream_generate_content(
        &self,
        body: &Value,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>>, ProxyError> {
        self.stream("streamGenerateContent?alt=sse", body).await
    }

    pub async fn call(&self, method: &str, body: &Value) -> Result<Value, ProxyError> {
        let response = self.send(method, body).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    /// Opens the SSE byte stream. A 401 on the first attempt gets a single
    /// retry after dropping the cached access token; any other non-2xx (and a
    /// second 401) surfaces as an upstream error.
    pub async fn stream(
        &self,
        method: &str,
        body: &Value,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>>, ProxyError> {
        let mut response = self.send(method, body).await?;
        if response.status().as_u16() == 401 {
            info!("upstream rejected the access token; refreshing and retrying once");
            self.tokens.invalidate().await;
            response = self.send(method, body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.bytes_stream())
    }

    async fn send(&self, method: &str, body: &Value) -> Result<reqwest::Response, ProxyError> {
        let token = self.tokens.access_token().await?;
        let url = endpoint_url(method);
        debug!("POST {}", url);
        Ok(self
            .http
            .post(&url)
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?)
    }

    /// Effective project id: the configured one, else the result of the
    /// onboarding handshake (performed once and cached on this client).
    pub async fn project_id(&self) -> Result<String, ProxyError> {
        if let Some(project) = &self.configured_project {
            return Ok(project.clone());
        }

        let mut cached = self.discovered_project.lock().await;
        if let Some(project) = cached.as_ref() {
            return Ok(project.clone());
        }

        let project = self.discover_project().await?;
        info!("discovered Code Assist project {}", project);
        *cached = Some(project.clone());
        Ok(project)
    }

    async fn discover_project(&self) -> Result<String, ProxyError> {
        let load = self
            .call(
                "loadCodeAssist",
                &json!({
                    "cloudaicompanionProject": DEFAULT_PROJECT,
                    "metadata": {"duetProject": DEFAULT_PROJECT}
                }),
            )
            .await?;

        if let Some(project) = companion_project(&load) {
            return Ok(project);
        }

        // Not onboarded yet; provision a tier and poll until done
        let tier_id = default_tier_id(&load);
        warn!("no Code Assist project yet; onboarding with tier {}", tier_id);

        for attempt in 0..ONBOARD_ATTEMPTS {
            let operation = self
                .call(
                    "onboardUser",
                    &json!({
                        "tierId": tier_id,
                        "cloudaicompanionProject": DEFAULT_PROJECT
                    }),
                )
                .await?;

            if operation
                .get("done")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                return Ok(operation_project(&operation)
                    .unwrap_or_else(|| DEFAULT_PROJECT.to_string()));
            }
            debug!("onboarding pending (attempt {})", attempt + 1);
            tokio::time::sleep(ONBOARD_POLL_INTERVAL).await;
        }

        Err(ProxyError::OnboardingTimeout)
    }
}

pub fn endpoint_url(method: &str) -> String {
    format!(
        "{}/{}:{}",
        CODE_ASSIST_ENDPOINT, CODE_ASSIST_API_VERSION, method
    )
}

fn companion_project(load: &Value) -> Option<String> {
    match load.get("cloudaicompanionProject")? {
        Value::String(id) => Some(id.clone()),
        Value::Object(obj) => obj.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn default_tier_id(load: &Value) -> String {
    load.get("allowedTiers")
        .and_then(Value::as_array)
        .and_then(|tiers| {
            tiers
                .iter()
                .find(|tier| tier.get("isDefault").and_then(Value::as_bool).unwrap_or(false))
        })
        .and_then(|tier| tier.get("id").and_then(Value::as_str))
        .unwrap_or("free-tier")
        .to_string()
}

fn operation_project(operation: &Value) -> Option<String> {
    operation
        .get("response")?
        .get("cloudaicompanionProject")?
        .get("id")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("generateContent"),
            "https://cloudcode-pa.googleapis.com/v1internal:generateContent"
        );
        assert_eq!(
            endpoint_url("streamGenerateContent?alt=sse"),
            "https://cloudcode-pa.googleapis.com/v1internal:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_companion_project_string_and_object_forms() {
        assert_eq!(
            companion_project(&json!({"cloudaicompanionProject": "proj-1"})),
            Some("proj-1".to_string())
        );
        assert_eq!(
            companion_project(&json!({"cloudaicompanionProject": {"id": "proj-2"}})),
            Some("proj-2".to_string())
        );
        assert_eq!(companion_project(&json!({})), None);
    }

    #[test]
    fn test_default_tier_prefers_flagged_tier() {
        let load = json!({"allowedTiers": [
            {"id": "paid", "isDefault": false},
            {"id": "standard", "isDefault": true}
        ]});
        assert_eq!(default_tier_id(&load), "standard");
    }

    #[test]
    fn test_default_tier_falls_back_to_free() {
        assert_eq!(default_tier_id(&json!({})), "free-tier");
        assert_eq!(default_tier_id(&json!({"allowedTiers": []})), "free-tier");
    }

    #[test]
    fn test_operation_project_extraction() {
        let op = json!({"done": true, "response": {"cloudaicompanionProject": {"id": "p-42"}}});
        assert_eq!(operation_project(&op), Some("p-42".to_string()));
        assert_eq!(operation_project(&json!({"done": true})), None);
    }
}

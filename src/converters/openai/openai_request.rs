use crate::converters::openai::{OpenAIMessage, OpenAITool, OpenAIToolChoice};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<OpenAIReasoning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<OpenAIToolChoice>,
    #[serde(flatten)]
    pub extra_fields: HashMap<String, serde_json::Value>,
}

/// Nested form of the effort hint, e.g. `{"reasoning": {"effort": "high"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIReasoning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
}

impl OpenAIRequest {
    /// Top-level `reasoning_effort` wins over the nested form.
    pub fn effort(&self) -> Option<&str> {
        self.reasoning_effort
            .as_deref()
            .or_else(|| self.reasoning.as_ref().and_then(|r| r.effort.as_deref()))
    }

    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effort_prefers_top_level() {
        let req: OpenAIRequest = serde_json::from_value(json!({
            "model": "gemini-2.5-pro",
            "messages": [],
            "reasoning_effort": "low",
            "reasoning": {"effort": "high"}
        }))
        .unwrap();
        assert_eq!(req.effort(), Some("low"));
    }

    #[test]
    fn test_effort_nested_fallback() {
        let req: OpenAIRequest = serde_json::from_value(json!({
            "model": "gemini-2.5-pro",
            "messages": [],
            "reasoning": {"effort": "medium"}
        }))
        .unwrap();
        assert_eq!(req.effort(), Some("medium"));
    }
}

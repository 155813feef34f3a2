use crate::converters::gemini::gemini_function_call::GeminiFunctionCall;
use crate::converters::gemini::gemini_function_response::GeminiFunctionResponse;
use crate::converters::gemini::GeminiInlineData;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        thought: Option<bool>,
        #[serde(rename = "thoughtSignature", alias = "thought_signature")]
        #[serde(skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
        #[serde(rename = "thoughtSignature", alias = "thought_signature")]
        #[serde(skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    /// Part shapes this proxy does not consume (code execution, file data, …).
    Other(serde_json::Value),
}

impl GeminiPart {
    pub fn text(text: impl Into<String>) -> Self {
        GeminiPart::Text {
            text: text.into(),
            thought: None,
            thought_signature: None,
        }
    }

    pub fn thought(text: impl Into<String>, signature: Option<String>) -> Self {
        GeminiPart::Text {
            text: text.into(),
            thought: Some(true),
            thought_signature: signature,
        }
    }
}

use crate::converters::openai::openai_content::OpenAIContent;
use crate::converters::openai::openai_tool_call::OpenAIToolCall;
use serde::{Deserialize, Serialize};

/// One chat message. Reasoning text and its opaque signature are accepted
/// under three field-name pairs for client interop; `reasoning_signature` /
/// `reasoning_text` resolve the first non-empty alias in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<OpenAIContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cot_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_opaque: Option<String>,
}

impl OpenAIMessage {
    pub fn reasoning_signature(&self) -> Option<&str> {
        first_non_empty(&[&self.signature, &self.cot_id, &self.reasoning_opaque])
    }

    pub fn reasoning_text(&self) -> Option<&str> {
        first_non_empty(&[&self.thinking, &self.cot_summary, &self.reasoning_text])
    }
}

fn first_non_empty<'a>(fields: &[&'a Option<String>]) -> Option<&'a str> {
    fields
        .iter()
        .filter_map(|f| f.as_deref())
        .find(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alias_priority() {
        let msg: OpenAIMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": "hi",
            "cot_id": "sig-b",
            "reasoning_opaque": "sig-c",
            "reasoning_text": "text-c"
        }))
        .unwrap();
        assert_eq!(msg.reasoning_signature(), Some("sig-b"));
        assert_eq!(msg.reasoning_text(), Some("text-c"));
    }

    #[test]
    fn test_empty_alias_is_skipped() {
        let msg: OpenAIMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": "hi",
            "signature": "",
            "cot_id": "sig-b"
        }))
        .unwrap();
        assert_eq!(msg.reasoning_signature(), Some("sig-b"));
        assert_eq!(msg.reasoning_text(), None);
    }
}

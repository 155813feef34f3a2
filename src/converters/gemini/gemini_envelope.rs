use crate::converters::gemini::{GeminiContent, GeminiUsage};
use serde::{Deserialize, Serialize};

/// One frame of the Code Assist SSE stream (and the body of a non-streaming
/// `generateContent` answer): the Gemini response nested under `response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<GeminiStreamResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiStreamResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiCandidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<GeminiContent>,
}

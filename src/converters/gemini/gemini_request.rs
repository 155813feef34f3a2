use crate::converters::gemini::{
    GeminiContent, GeminiGenerationConfig, GeminiTool, GeminiToolConfig,
};
use serde::{Deserialize, Serialize};

/// Outer Code Assist envelope; the API nests the Gemini request under
/// `request` next to the model and project routing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeAssistRequest {
    pub model: String,
    pub project: String,
    pub request: GeminiRequestBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiRequestBody {
    pub contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GeminiTool>>,
    #[serde(rename = "toolConfig")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<GeminiToolConfig>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GeminiGenerationConfig,
}

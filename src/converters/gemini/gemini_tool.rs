use crate::converters::gemini::GeminiFunctionDeclaration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiTool {
    #[serde(rename = "functionDeclarations")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_declarations: Option<Vec<GeminiFunctionDeclaration>>,
    #[serde(rename = "googleSearch")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_search: Option<GeminiGoogleSearch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiGoogleSearch {}

impl GeminiTool {
    pub fn functions(declarations: Vec<GeminiFunctionDeclaration>) -> Self {
        GeminiTool {
            function_declarations: Some(declarations),
            google_search: None,
        }
    }

    pub fn google_search() -> Self {
        GeminiTool {
            function_declarations: None,
            google_search: Some(GeminiGoogleSearch::default()),
        }
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    pub id: String,
    #[serde(default = "function_type")]
    pub r#type: String,
    pub function: OpenAIToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCallFunction {
    pub name: String,
    /// JSON-encoded arguments object, as on the OpenAI wire.
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

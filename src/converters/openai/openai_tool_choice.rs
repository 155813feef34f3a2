use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAIToolChoice {
    /// "none" | "auto" | "required"
    Mode(String),
    Named {
        r#type: String,
        function: OpenAIFunctionRef,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunctionRef {
    pub name: String,
}

use crate::converters::openai::OpenAIContentItem;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentItem>),
    /// Anything else a client sends; stringified during translation.
    Other(Value),
}

impl OpenAIContent {
    /// Concatenated text of the content, part texts in order.
    pub fn text(&self) -> String {
        match self {
            OpenAIContent::Text(text) => text.clone(),
            OpenAIContent::Parts(items) => items
                .iter()
                .filter_map(|item| item.text.as_deref())
                .collect::<Vec<_>>()
                .concat(),
            OpenAIContent::Other(value) => value.to_string(),
        }
    }
}

pub mod openai_content;
pub mod openai_content_item;
pub mod openai_image_url;
pub mod openai_message;
pub mod openai_request;
pub mod openai_response;
pub mod openai_stream_chunk;
pub mod openai_tool;
pub mod openai_tool_call;
pub mod openai_tool_choice;
pub mod openai_usage;

pub use openai_content::OpenAIContent;
pub use openai_content_item::OpenAIContentItem;
pub use openai_image_url::OpenAIImageUrl;
pub use openai_message::OpenAIMessage;
pub use openai_request::{OpenAIReasoning, OpenAIRequest};
pub use openai_response::{OpenAIChoice, OpenAIResponse, OpenAIResponseMessage};
pub use openai_stream_chunk::{
    OpenAIStreamChoice, OpenAIStreamChunk, OpenAIStreamDelta, OpenAIStreamToolCall,
    OpenAIStreamToolCallFunction,
};
pub use openai_tool::{OpenAIFunction, OpenAITool};
pub use openai_tool_call::{OpenAIToolCall, OpenAIToolCallFunction};
pub use openai_tool_choice::{OpenAIFunctionRef, OpenAIToolChoice};
pub use openai_usage::OpenAIUsage;
